// Writer pool behaviour under concurrent load
//
//   cargo test --test writer_pool -- --nocapture

use dmxp_localthr::error::PoolError;
use dmxp_localthr::Pool::{DiscardSink, PayloadSink, Persisted, WriterPool};
use dmxp_localthr::Transport::Message;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Start/end stamps of one write task on a shared logical clock.
#[derive(Debug, Clone, Copy)]
struct TaskSpan {
    sequence_id: u64,
    start: u64,
    end: u64,
}

/// Sink that sleeps a little per payload and records when each task ran.
#[derive(Default)]
struct RecordingSink {
    clock: AtomicU64,
    active: AtomicUsize,
    peak: AtomicUsize,
    spans: Mutex<Vec<TaskSpan>>,
    fail_every: Option<u64>,
}

impl RecordingSink {
    fn failing_every(n: u64) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::default()
        }
    }

    fn spans_by_id(&self) -> Vec<TaskSpan> {
        let mut spans = self.spans.lock().clone();
        spans.sort_by_key(|span| span.sequence_id);
        spans
    }
}

impl PayloadSink for RecordingSink {
    fn persist(&self, sequence_id: u64, payload: &[u8]) -> io::Result<Persisted> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let start = self.clock.fetch_add(1, Ordering::SeqCst);

        std::thread::sleep(Duration::from_micros(fastrand::u64(50..400)));

        let end = self.clock.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().push(TaskSpan {
            sequence_id,
            start,
            end,
        });

        match self.fail_every {
            Some(n) if sequence_id % n == 0 => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("failed to open file test{sequence_id:06}.dat"),
            )),
            _ => Ok(Persisted::Written(payload.len())),
        }
    }
}

fn feed(pool: &mut WriterPool, count: u64, size: usize) {
    let workers = pool.size() as u64;
    for write in 0..count {
        let message = Message::with_sequence(write as u32, size);
        pool.submit((write % workers) as usize, message, write)
            .expect("submit failed");
    }
}

#[test]
fn running_tasks_never_exceed_pool_size() {
    for workers in 1..=10 {
        let sink = Arc::new(RecordingSink::default());
        let mut pool = WriterPool::new(workers, sink.clone()).unwrap();
        feed(&mut pool, 200, 256);
        pool.shutdown();

        let peak = sink.peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(
            peak <= workers,
            "pool of {workers} ran {peak} writes at once"
        );
        assert!(pool.stats().peak_active <= workers);
        assert_eq!(sink.spans.lock().len(), 200);
    }
}

#[test]
fn a_slot_finishes_before_it_is_reused() {
    let workers = 4;
    let sink = Arc::new(RecordingSink::default());
    let mut pool = WriterPool::new(workers, sink.clone()).unwrap();
    feed(&mut pool, 400, 128);
    pool.shutdown();

    let spans = sink.spans_by_id();
    assert_eq!(spans.len(), 400);
    for pair in spans.windows(workers + 1) {
        let (earlier, later) = (pair[0], pair[workers]);
        assert_eq!(later.sequence_id, earlier.sequence_id + workers as u64);
        assert!(
            earlier.end < later.start,
            "write {} started before write {} finished",
            later.sequence_id,
            earlier.sequence_id
        );
    }

    for slot in 0..workers {
        assert_eq!(pool.dispatched(slot), Some(100));
    }
}

#[test]
fn every_buffer_is_released_once_even_when_writes_fail() {
    let sink = Arc::new(RecordingSink::failing_every(7));
    let mut pool = WriterPool::new(3, sink).unwrap();
    feed(&mut pool, 300, 64);
    pool.shutdown();

    let stats = pool.stats();
    assert_eq!(stats.submitted, 300);
    assert_eq!(stats.released, 300);
    // ids 0, 7, 14, ... 294
    assert_eq!(stats.failed, 43);
    assert_eq!(stats.persisted, 300 - 43);
    assert_eq!(stats.discarded, 0);
}

#[test]
fn discard_sink_only_counts() {
    let mut pool = WriterPool::new(2, Arc::new(DiscardSink)).unwrap();
    feed(&mut pool, 50, 32);
    pool.shutdown();

    let stats = pool.stats();
    assert_eq!(stats.discarded, 50);
    assert_eq!(stats.persisted, 0);
    assert_eq!(stats.released, 50);
}

#[test]
fn pool_size_is_clamped() {
    assert_eq!(WriterPool::new(0, Arc::new(DiscardSink)).unwrap().size(), 1);
    assert_eq!(WriterPool::new(64, Arc::new(DiscardSink)).unwrap().size(), 10);
}

#[test]
fn out_of_range_slot_is_rejected() {
    let mut pool = WriterPool::new(2, Arc::new(DiscardSink)).unwrap();
    let err = pool.submit(2, Message::with_sequence(0, 8), 0).unwrap_err();
    assert!(matches!(err, PoolError::NoSuchSlot { index: 2, size: 2 }));
    assert_eq!(pool.stats().submitted, 0);
}

/// Sink that blocks every write until the gate opens.
struct GatedSink {
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedSink {
    fn new() -> Self {
        Self {
            open: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl PayloadSink for GatedSink {
    fn persist(&self, _sequence_id: u64, payload: &[u8]) -> io::Result<Persisted> {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        Ok(Persisted::Written(payload.len()))
    }
}

#[test]
fn stalled_slot_times_out_when_asked_to() {
    let sink = Arc::new(GatedSink::new());
    let mut pool = WriterPool::new(1, sink.clone())
        .unwrap()
        .with_stall_timeout(Some(Duration::from_millis(50)));

    pool.submit(0, Message::with_sequence(0, 16), 0).unwrap();
    assert_eq!(pool.in_flight(), 1);

    let err = pool.submit(0, Message::with_sequence(1, 16), 1).unwrap_err();
    assert!(matches!(err, PoolError::Stalled { index: 0, .. }), "{err}");

    sink.open();
    pool.shutdown();
    let stats = pool.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(pool.in_flight(), 0);
}

#[test]
fn without_a_timeout_submit_waits_for_the_slot() {
    let sink = Arc::new(GatedSink::new());
    let mut pool = WriterPool::new(1, sink.clone()).unwrap();
    pool.submit(0, Message::with_sequence(0, 16), 0).unwrap();

    let opener = {
        let sink = Arc::clone(&sink);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            sink.open();
        })
    };

    // blocks until the opener lets the first write finish
    pool.submit(0, Message::with_sequence(1, 16), 1).unwrap();
    opener.join().unwrap();
    pool.shutdown();
    assert_eq!(pool.stats().persisted, 2);
}

#[test]
fn dropping_a_pool_does_not_wait_on_a_stuck_write() {
    let sink = Arc::new(GatedSink::new());
    let mut pool = WriterPool::new(2, sink.clone())
        .unwrap()
        .with_stall_timeout(Some(Duration::from_millis(50)));

    pool.submit(0, Message::with_sequence(0, 16), 0).unwrap();
    pool.submit(1, Message::with_sequence(1, 16), 1).unwrap();
    assert!(matches!(
        pool.submit(0, Message::with_sequence(2, 16), 2),
        Err(PoolError::Stalled { index: 0, .. })
    ));
    assert!(matches!(pool.drain(), Err(PoolError::Stalled { .. })));

    let started = Instant::now();
    drop(pool);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "drop blocked for {:?}",
        started.elapsed()
    );

    // let the detached writers finish
    sink.open();
}

#[test]
fn drain_waits_for_queued_writes() {
    let sink = Arc::new(RecordingSink::default());
    let mut pool = WriterPool::new(3, sink.clone()).unwrap();
    feed(&mut pool, 30, 64);

    pool.drain().unwrap();
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(sink.spans.lock().len(), 30);
    pool.shutdown();
    assert_eq!(pool.stats().released, 30);
}
