use super::*;
use std::sync::atomic::Ordering;

/// Read-only views of the pool, for reporting and tests.
impl WriterPool {
    /// Number of slots (and writer threads).
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Snapshot of the shared counters.
    ///
    /// Loads are relaxed; exact totals are only guaranteed after
    /// [`shutdown`](WriterPool::shutdown).
    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            persisted: c.persisted.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            released: c.released.load(Ordering::Relaxed),
            peak_active: c.peak_active.load(Ordering::Relaxed),
        }
    }

    /// Slots currently holding a job, queued or running.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state.is_busy()).count()
    }

    /// How many jobs slot `index` has been given so far.
    pub fn dispatched(&self, index: usize) -> Option<u64> {
        self.slots.get(index).map(|slot| slot.dispatched)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout
    }
}
