use super::sink::{PayloadSink, Persisted};
use crate::config::clamp_workers;
use crate::error::PoolError;
use crate::Transport::Message;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
mod debug;
mod getters;

// Use parking_lot's Mutex/Condvar for the per-slot handoff
use parking_lot::{Condvar, Mutex, MutexGuard};

/// Busy flag for one slot. Set by the main loop when it hands a job over,
/// cleared by the worker once the job and its buffer are gone.
pub(crate) struct SlotState {
    busy: Mutex<bool>,
    idle: Condvar,
}

impl SlotState {
    fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            idle: Condvar::new(),
        }
    }

    /// Wait until the slot's previous job has terminated, then claim it.
    fn acquire(&self, index: usize, timeout: Option<Duration>) -> Result<(), PoolError> {
        let mut busy = self.busy.lock();
        self.wait_while_busy(&mut busy, index, timeout)?;
        *busy = true;
        Ok(())
    }

    /// Wait until the slot's job has terminated without claiming it.
    fn wait_idle(&self, index: usize, timeout: Option<Duration>) -> Result<(), PoolError> {
        let mut busy = self.busy.lock();
        self.wait_while_busy(&mut busy, index, timeout)
    }

    fn wait_while_busy(
        &self,
        busy: &mut MutexGuard<'_, bool>,
        index: usize,
        timeout: Option<Duration>,
    ) -> Result<(), PoolError> {
        match timeout {
            None => {
                while **busy {
                    self.idle.wait(busy);
                }
            }
            Some(limit) => {
                let deadline = Instant::now() + limit;
                while **busy {
                    if self.idle.wait_until(busy, deadline).timed_out() && **busy {
                        return Err(PoolError::Stalled {
                            index,
                            waited: limit,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn release(&self) {
        *self.busy.lock() = false;
        self.idle.notify_one();
    }

    pub(crate) fn is_busy(&self) -> bool {
        *self.busy.lock()
    }
}

/// Shared counters, updated by the workers.
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) submitted: AtomicU64,
    pub(crate) persisted: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) active: AtomicUsize,
    pub(crate) peak_active: AtomicUsize,
}

/// A point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs handed to a slot.
    pub submitted: u64,
    /// Payloads written to the sink.
    pub persisted: u64,
    /// Payloads dropped by a discard sink.
    pub discarded: u64,
    /// Payloads whose persistence failed (logged, not retried).
    pub failed: u64,
    /// Message buffers freed. Equals `submitted` once the pool is drained.
    pub released: u64,
    /// Most write tasks observed running at once.
    pub peak_active: usize,
}

/// One unit of work. Owns its message exclusively; dropping the job frees
/// the buffer and counts the release, wherever that happens.
struct WriteJob {
    sequence_id: u64,
    message: Message,
    counters: Arc<Counters>,
}

impl Drop for WriteJob {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// Marks a write task as running; clears the slot when the task ends,
/// even if the sink panicked.
struct ActiveTask<'a> {
    state: &'a SlotState,
    counters: &'a Counters,
}

impl<'a> ActiveTask<'a> {
    fn begin(state: &'a SlotState, counters: &'a Counters) -> Self {
        let now = counters.active.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak_active.fetch_max(now, Ordering::AcqRel);
        Self { state, counters }
    }
}

impl Drop for ActiveTask<'_> {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        self.state.release();
    }
}

pub(crate) struct Slot {
    pub(crate) index: usize,
    pub(crate) state: Arc<SlotState>,
    jobs: Option<mpsc::Sender<WriteJob>>,
    worker: Option<JoinHandle<()>>,
    pub(crate) dispatched: u64,
}

/// A fixed ring of writer slots, each backed by one long-lived thread.
///
/// ### Concurrency Design:
/// - **Main loop**: the only caller of [`submit`](Self::submit). It claims
///   slot `i` by waiting on the slot's busy flag, then sends one job down
///   the slot's channel.
/// - **Workers**: each thread takes one job at a time, persists it, drops
///   the buffer and only then clears the busy flag.
///
/// So at most one job per slot exists at any instant (queued or running),
/// which caps running writes at the pool size and resident buffers at
/// pool size + the one the main loop is holding.
pub struct WriterPool {
    pub(crate) slots: Vec<CachePadded<Slot>>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) stall_timeout: Option<Duration>,
}

impl WriterPool {
    /// Start `size` writer threads (clamped into `[1, MAX_WORKERS]`).
    pub fn new(size: usize, sink: Arc<dyn PayloadSink>) -> Result<Self, PoolError> {
        let size = clamp_workers(size);
        let counters = Arc::new(Counters::default());
        let mut slots = Vec::with_capacity(size);

        for index in 0..size {
            let state = Arc::new(SlotState::new());
            let (tx, rx) = mpsc::channel::<WriteJob>();

            let worker = {
                let state = Arc::clone(&state);
                let sink = Arc::clone(&sink);
                let counters = Arc::clone(&counters);
                thread::Builder::new()
                    .name(format!("file-writer-{index}"))
                    .spawn(move || run_worker(index, rx, &state, &*sink, &counters))
                    .map_err(PoolError::Spawn)?
            };

            slots.push(CachePadded::new(Slot {
                index,
                state,
                jobs: Some(tx),
                worker: Some(worker),
                dispatched: 0,
            }));
        }

        debug!(size, "writer pool started");
        Ok(Self {
            slots,
            counters,
            stall_timeout: None,
        })
    }

    /// Give up on a busy slot after `timeout` instead of waiting forever.
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Hand `message` to slot `slot_index` as write number `sequence_id`.
    ///
    /// Blocks until the slot's previous job has terminated. The message is
    /// moved into the job; the caller keeps no reference to it.
    pub fn submit(
        &mut self,
        slot_index: usize,
        message: Message,
        sequence_id: u64,
    ) -> Result<(), PoolError> {
        let size = self.slots.len();
        let slot = self.slots.get_mut(slot_index).ok_or(PoolError::NoSuchSlot {
            index: slot_index,
            size,
        })?;

        slot.state.acquire(slot_index, self.stall_timeout)?;

        let job = WriteJob {
            sequence_id,
            message,
            counters: Arc::clone(&self.counters),
        };
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let sent = match slot.jobs.as_ref() {
            Some(jobs) => jobs.send(job).is_ok(),
            None => false,
        };
        if !sent {
            slot.state.release();
            return Err(PoolError::WorkerGone { index: slot_index });
        }

        slot.dispatched += 1;
        Ok(())
    }

    /// Wait for every outstanding write, giving up on a slot that stays
    /// busy past the stall timeout (if one is set).
    pub fn drain(&self) -> Result<(), PoolError> {
        for slot in self.slots.iter() {
            slot.state.wait_idle(slot.index, self.stall_timeout)?;
        }
        Ok(())
    }

    /// Stop accepting work and wait for every outstanding write.
    pub fn shutdown(&mut self) {
        self.close_channels();
        for slot in self.slots.iter_mut() {
            if let Some(worker) = slot.worker.take() {
                if worker.join().is_err() {
                    warn!(slot = slot.index, "writer thread panicked");
                }
            }
        }
    }

    fn close_channels(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.jobs.take();
        }
    }
}

impl Drop for WriterPool {
    /// Joins idle workers only. A worker still inside a write is detached;
    /// it exits on its own once the write returns.
    fn drop(&mut self) {
        self.close_channels();
        for slot in self.slots.iter_mut() {
            let Some(worker) = slot.worker.take() else {
                continue;
            };
            if slot.state.is_busy() {
                warn!(slot = slot.index, "detaching writer thread with a write in flight");
                continue;
            }
            if worker.join().is_err() {
                warn!(slot = slot.index, "writer thread panicked");
            }
        }
    }
}

fn run_worker(
    index: usize,
    jobs: mpsc::Receiver<WriteJob>,
    state: &SlotState,
    sink: &dyn PayloadSink,
    counters: &Counters,
) {
    for job in jobs {
        let _task = ActiveTask::begin(state, counters);
        write_one(index, job, sink, counters);
    }
}

fn write_one(index: usize, job: WriteJob, sink: &dyn PayloadSink, counters: &Counters) {
    match sink.persist(job.sequence_id, job.message.as_bytes()) {
        Ok(Persisted::Written(_)) => {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Persisted::Discarded) => {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(slot = index, sequence_id = job.sequence_id, "file_writer(): {e}");
        }
    }
    // job (and its buffer) is dropped here, before the slot is marked idle
}
