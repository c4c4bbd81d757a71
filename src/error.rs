//! Error types for the receiver.
//!
//! Transport and pool failures keep their own enums so the main loop can
//! tell a fatal setup error from a failure in the middle of a run.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by an [`Endpoint`](crate::Transport::Endpoint) or a
/// [`PushSocket`](crate::Transport::PushSocket).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unsupported endpoint address '{0}' (expected tcp://host:port or ipc://path)")]
    UnsupportedScheme(String),

    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("peer closed mid-frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },

    #[error("endpoint is closed")]
    Closed,

    #[error("interrupted")]
    Interrupted,

    #[error("close failed: {0}")]
    Close(#[source] io::Error),
}

/// Failures raised by the [`WriterPool`](crate::Pool::writer::WriterPool).
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("slot {index} out of range for a pool of {size}")]
    NoSuchSlot { index: usize, size: usize },

    #[error("slot {index} still busy after {waited:?}")]
    Stalled { index: usize, waited: Duration },

    #[error("writer for slot {index} is gone")]
    WorkerGone { index: usize },

    #[error("cannot start writer thread: {0}")]
    Spawn(#[source] io::Error),
}

/// The step of a run a transport failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Socket,
    Bind,
    FirstReceive,
    Receive,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Socket => "socket",
            Operation::Bind => "bind",
            Operation::FirstReceive => "recv (first message)",
            Operation::Receive => "recv",
            Operation::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("error in {op}: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: TransportError,
    },

    #[error("writer pool: {0}")]
    Pool(#[from] PoolError),

    #[error("cannot write report: {0}")]
    Report(#[from] io::Error),
}

impl Error {
    pub fn transport(op: Operation, source: TransportError) -> Self {
        Error::Transport { op, source }
    }

    /// Process exit status for this failure. Each setup step gets its own
    /// code so scripts driving the benchmark can tell them apart.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 1,
            Error::Transport { op, .. } => match op {
                Operation::Socket => 2,
                Operation::Bind => 3,
                Operation::FirstReceive => 4,
                Operation::Receive => 5,
                Operation::Close => 6,
            },
            Error::Pool(_) => 7,
            Error::Report(_) => 8,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
