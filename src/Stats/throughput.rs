// Wall-clock windows and the derived throughput figures

use std::fmt;
use std::time::Instant;

/// Messages per interim checkpoint.
pub const CHECKPOINT_INTERVAL: u64 = 1000;

/// A running timer measured in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Microseconds since start, never less than 1.
    pub fn stop(self) -> u64 {
        elapsed_us(self.started)
    }

    /// Close the current window and open a new one in its place.
    pub fn restart(&mut self) -> u64 {
        let now = Instant::now();
        let elapsed = clamp_us(now.duration_since(self.started).as_micros());
        self.started = now;
        elapsed
    }
}

fn elapsed_us(since: Instant) -> u64 {
    clamp_us(since.elapsed().as_micros())
}

fn clamp_us(us: u128) -> u64 {
    u64::try_from(us).unwrap_or(u64::MAX).max(1)
}

/// Throughput over one closed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub msgs_per_sec: u64,
    pub megabytes_per_sec: f64,
    pub megabits_per_sec: f64,
}

impl Snapshot {
    /// `count` messages of `message_size` bytes in `elapsed_us`.
    /// MB here is 10^6 bytes, Mb 10^6 bits.
    pub fn compute(count: u64, elapsed_us: u64, message_size: usize) -> Self {
        let elapsed_us = elapsed_us.max(1);
        let msgs_per_sec = (count as f64 * 1_000_000.0 / elapsed_us as f64).round() as u64;
        let megabytes_per_sec = msgs_per_sec as f64 * message_size as f64 / 1_000_000.0;
        Self {
            msgs_per_sec,
            megabytes_per_sec,
            megabits_per_sec: megabytes_per_sec * 8.0,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [msg/s] {:.3} [MB/s] {:.3} [Mb/s]",
            self.msgs_per_sec, self.megabytes_per_sec, self.megabits_per_sec
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_from_a_window() {
        // 1000 messages in 0.5 s
        let snap = Snapshot::compute(1000, 500_000, 1024);
        assert_eq!(snap.msgs_per_sec, 2000);
        assert!((snap.megabytes_per_sec - 2.048).abs() < 1e-9);
        assert!((snap.megabits_per_sec - 16.384).abs() < 1e-9);
        assert_eq!(snap.to_string(), "2000 [msg/s] 2.048 [MB/s] 16.384 [Mb/s]");
    }

    #[test]
    fn rate_is_rounded() {
        // 2000 / 0.3 s = 6666.67
        assert_eq!(Snapshot::compute(2000, 300_000, 1).msgs_per_sec, 6667);
    }

    #[test]
    fn zero_elapsed_is_one_microsecond() {
        let snap = Snapshot::compute(3, 0, 10);
        assert_eq!(snap.msgs_per_sec, 3_000_000);
        assert!(Stopwatch::start().stop() >= 1);
    }

    #[test]
    fn restart_opens_a_new_window() {
        let mut watch = Stopwatch::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let first = watch.restart();
        let second = watch.restart();
        assert!(first >= 5_000);
        assert!(second < first);
    }
}
