use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Upper bound on concurrent writer threads.
pub const MAX_WORKERS: usize = 10;

/// Mountpoint value that turns off disk persistence entirely.
pub const DISCARD_MOUNTPOINT: &str = "/network";

/// Where received payloads end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// Measure the network only; nothing touches the disk.
    Discard,
    /// Write one file per message under `<root>/data/`.
    Directory(PathBuf),
}

impl Sink {
    pub fn from_mountpoint(mountpoint: &str) -> Self {
        if mountpoint == DISCARD_MOUNTPOINT {
            Sink::Discard
        } else {
            Sink::Directory(PathBuf::from(mountpoint))
        }
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Sink::Discard)
    }

    /// Path of the file holding write number `sequence_id`, if this sink
    /// writes files at all.
    pub fn file_path(&self, sequence_id: u64) -> Option<PathBuf> {
        match self {
            Sink::Discard => None,
            Sink::Directory(root) => Some(data_file(root, sequence_id)),
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Discard => f.write_str(DISCARD_MOUNTPOINT),
            Sink::Directory(root) => write!(f, "{}", root.display()),
        }
    }
}

pub(crate) fn data_file(root: &Path, sequence_id: u64) -> PathBuf {
    root.join("data").join(format!("test{sequence_id:06}.dat"))
}

/// Clamp a requested writer count into `[1, MAX_WORKERS]`.
pub fn clamp_workers(requested: usize) -> usize {
    let workers = requested.clamp(1, MAX_WORKERS);
    if workers != requested {
        warn!(requested, using = workers, "writer thread count out of range");
    }
    workers
}

/// Everything a run needs to know. Fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub bind: String,
    pub message_size: usize,
    pub message_count: u64,
    pub sink: Sink,
    pub workers: usize,
    /// Opt-in bound on how long the main loop waits for a busy slot.
    /// `None` waits forever.
    pub stall_timeout: Option<Duration>,
}

impl RunConfig {
    pub fn builder(bind: impl Into<String>) -> RunConfigBuilder {
        RunConfigBuilder::new(bind)
    }
}

pub struct RunConfigBuilder {
    bind: String,
    message_size: usize,
    message_count: u64,
    sink: Sink,
    workers: usize,
    stall_timeout: Option<Duration>,
}

impl RunConfigBuilder {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            message_size: 1024,
            message_count: 1000,
            sink: Sink::Discard,
            workers: 1,
            stall_timeout: None,
        }
    }

    pub fn with_message_size(mut self, size: usize) -> Self {
        self.message_size = size;
        self
    }

    pub fn with_message_count(mut self, count: u64) -> Self {
        self.message_count = count;
        self
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_mountpoint(self, mountpoint: &str) -> Self {
        self.with_sink(Sink::from_mountpoint(mountpoint))
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = clamp_workers(workers);
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        if self.message_size == 0 {
            return Err(Error::Config("message size must be positive".into()));
        }
        if self.message_count == 0 {
            return Err(Error::Config("message count must be positive".into()));
        }
        if self.stall_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("stall timeout must be positive".into()));
        }

        Ok(RunConfig {
            bind: self.bind,
            message_size: self.message_size,
            message_count: self.message_count,
            sink: self.sink,
            workers: self.workers,
            stall_timeout: self.stall_timeout,
        })
    }
}
