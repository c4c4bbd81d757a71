//! The receive loop.
//!
//! One thread pulls messages off the endpoint, checks them, and hands each
//! buffer to the writer pool; throughput is reported every
//! [`CHECKPOINT_INTERVAL`] messages and once at the end.

use crate::config::RunConfig;
use crate::error::{Error, Operation, Result, TransportError};
use crate::Pool::sink::PayloadSink;
use crate::Pool::writer::{PoolStats, WriterPool};
use crate::Stats::sequence::SequenceValidator;
use crate::Stats::throughput::{Snapshot, Stopwatch, CHECKPOINT_INTERVAL};
use crate::Transport::{Endpoint, Message, StreamEndpoint};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitFirstMessage,
    Streaming,
    Draining,
    Reporting,
    Terminated,
}

/// Outcome of a completed (or interrupted) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub message_size: usize,
    /// Messages the run was configured for.
    pub message_count: u64,
    /// Messages actually received, seed message included.
    pub received: u64,
    pub elapsed_us: u64,
    pub throughput: Snapshot,
    pub checkpoints: u64,
    pub size_mismatches: u64,
    pub sequence_gaps: u64,
    pub interrupted: bool,
    pub pool: PoolStats,
}

impl RunSummary {
    /// Final block in the plot-friendly format; diagnostics are `#` lines.
    pub fn write_report<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "message size: {} [B]", self.message_size)?;
        writeln!(out, "message count: {}", self.received)?;
        writeln!(out, "mean throughput: {} [msg/s]", self.throughput.msgs_per_sec)?;
        writeln!(
            out,
            "mean throughput: {:.3} [MB/s] {:.3} [Mb/s]",
            self.throughput.megabytes_per_sec, self.throughput.megabits_per_sec
        )?;
        writeln!(out, "#sequence gaps: {}", self.sequence_gaps)?;
        writeln!(out, "#size mismatches: {}", self.size_mismatches)?;
        writeln!(
            out,
            "#files written: {} discarded: {} failed: {}",
            self.pool.persisted, self.pool.discarded, self.pool.failed
        )?;
        if self.interrupted {
            writeln!(
                out,
                "#interrupted after {} of {} messages",
                self.received, self.message_count
            )?;
        }
        out.flush()
    }
}

/// Configuration echo printed before the endpoint is bound.
pub fn write_header<W: Write>(out: &mut W, config: &RunConfig, hostname: &str) -> std::io::Result<()> {
    writeln!(
        out,
        "#local_thr local host {} disk {} bind to {} message size {} message count {} writer threads {}",
        hostname, config.sink, config.bind, config.message_size, config.message_count, config.workers
    )?;
    out.flush()
}

/// Bind the configured address, sorting failures into the socket-type
/// and bind setup steps.
pub fn bind_endpoint(address: &str) -> Result<StreamEndpoint> {
    StreamEndpoint::bind(address).map_err(|e| match e {
        TransportError::UnsupportedScheme(_) => Error::transport(Operation::Socket, e),
        other => Error::transport(Operation::Bind, other),
    })
}

/// Per-run counters gathered by the receive loop.
#[derive(Default)]
struct Tally {
    received: u64,
    checkpoints: u64,
    size_mismatches: u64,
    sequence_gaps: u64,
    interrupted: bool,
}

pub struct Runner<E: Endpoint> {
    config: RunConfig,
    endpoint: E,
    pool: WriterPool,
    phase: Phase,
    running: Arc<AtomicBool>,
}

impl<E: Endpoint> Runner<E> {
    /// Runner persisting into the sink named by `config`.
    pub fn new(config: RunConfig, endpoint: E) -> Result<Self> {
        let sink = config.sink.clone().into_payload_sink();
        Self::with_sink(config, endpoint, sink)
    }

    /// Runner persisting into a caller-supplied sink.
    pub fn with_sink(config: RunConfig, endpoint: E, sink: Arc<dyn PayloadSink>) -> Result<Self> {
        let pool = WriterPool::new(config.workers, sink)?.with_stall_timeout(config.stall_timeout);
        Ok(Self {
            config,
            endpoint,
            pool,
            phase: Phase::AwaitFirstMessage,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Stop streaming early once `running` is cleared (e.g. from a
    /// Ctrl+C handler). The run still reports what it received.
    pub fn with_interrupt(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
    }

    fn size_matches(&self, message: &Message) -> bool {
        if message.len() == self.config.message_size {
            return true;
        }
        warn!(
            size = message.len(),
            expected = self.config.message_size,
            "message of incorrect size received"
        );
        false
    }

    fn check_sequence(validator: &mut SequenceValidator, message: &Message) {
        match message.sequence() {
            Some(sequence) => {
                validator.observe(sequence);
            }
            None => warn!(size = message.len(), "message too short to carry a counter"),
        }
    }

    /// Hand `message` to slot `write mod N` as write number `write`.
    fn dispatch(&mut self, message: Message, write: &mut u64) -> Result<()> {
        let slot = (*write % self.pool.size() as u64) as usize;
        self.pool.submit(slot, message, *write)?;
        *write += 1;
        Ok(())
    }

    /// Drive the whole run, writing report lines to `out`.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<RunSummary> {
        let size = self.config.message_size;
        let mut tally = Tally::default();
        let mut validator = SequenceValidator::new();
        let mut write = 0u64;

        self.enter(Phase::AwaitFirstMessage);
        let first = match self.endpoint.receive() {
            Ok(message) => message,
            Err(TransportError::Interrupted) => {
                info!("run interrupted before the first message");
                tally.interrupted = true;
                return self.finish(out, tally, 0);
            }
            Err(e) => return Err(Error::transport(Operation::FirstReceive, e)),
        };
        if !self.size_matches(&first) {
            tally.size_mismatches += 1;
        }
        Self::check_sequence(&mut validator, &first);

        let overall = Stopwatch::start();
        let mut window = Stopwatch::start();
        self.dispatch(first, &mut write)?;
        tally.received = 1;

        writeln!(out, "#mean throughput for {CHECKPOINT_INTERVAL} msg: ")?;

        self.enter(Phase::Streaming);
        for i in 0..self.config.message_count.saturating_sub(1) {
            if !self.running.load(Ordering::Acquire) {
                tally.interrupted = true;
                break;
            }

            let message = match self.endpoint.receive() {
                Ok(message) => message,
                Err(TransportError::Interrupted) => {
                    tally.interrupted = true;
                    break;
                }
                Err(e) => return Err(Error::transport(Operation::Receive, e)),
            };
            tally.received += 1;

            if !self.size_matches(&message) {
                tally.size_mismatches += 1;
            }
            Self::check_sequence(&mut validator, &message);
            self.dispatch(message, &mut write)?;

            if i > 0 && i % CHECKPOINT_INTERVAL == 0 {
                let snapshot = Snapshot::compute(CHECKPOINT_INTERVAL, window.restart(), size);
                writeln!(out, "{snapshot}")?;
                out.flush()?;
                tally.checkpoints += 1;
            }
        }
        if tally.interrupted {
            info!(received = tally.received, "run interrupted");
        }

        tally.sequence_gaps = validator.gaps();
        let elapsed_us = overall.stop();
        self.finish(out, tally, elapsed_us)
    }

    /// Wait for the writers, print the final report and close the endpoint.
    fn finish<W: Write>(&mut self, out: &mut W, tally: Tally, elapsed_us: u64) -> Result<RunSummary> {
        let size = self.config.message_size;

        self.enter(Phase::Draining);
        debug!(in_flight = self.pool.in_flight(), "waiting for outstanding writes");
        self.pool.drain()?;
        self.pool.shutdown();

        self.enter(Phase::Reporting);
        let summary = RunSummary {
            message_size: size,
            message_count: self.config.message_count,
            received: tally.received,
            elapsed_us,
            throughput: Snapshot::compute(tally.received, elapsed_us, size),
            checkpoints: tally.checkpoints,
            size_mismatches: tally.size_mismatches,
            sequence_gaps: tally.sequence_gaps,
            interrupted: tally.interrupted,
            pool: self.pool.stats(),
        };
        summary.write_report(out)?;
        self.endpoint
            .close()
            .map_err(|e| Error::transport(Operation::Close, e))?;

        self.enter(Phase::Terminated);
        Ok(summary)
    }
}
