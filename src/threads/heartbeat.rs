//! heartbeat.rs
//! Lock-free progress stamp written by a loop and read by the watchdog.
//!
//! Times are microseconds since a process-wide monotonic anchor, so they fit
//! in an `AtomicU64` and are unaffected by wall-clock changes.

use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

#[derive(Debug)]
pub struct Heartbeat {
    name: &'static str,
    last_beat: AtomicU64,
    beats: AtomicU64,
}

impl Heartbeat {
    /// Starts fresh: a loop is not stale before its first cycle.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            last_beat: AtomicU64::new(monotonic_micros()),
            beats: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Record progress.
    #[inline]
    pub fn beat(&self) {
        self.last_beat.store(monotonic_micros(), Ordering::Release);
        self.beats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn since_last_beat(&self) -> Duration {
        let last = self.last_beat.load(Ordering::Acquire);
        Duration::from_micros(monotonic_micros().saturating_sub(last))
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.since_last_beat() > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fresh_heartbeat_is_alive() {
        let heartbeat = Heartbeat::new("test");
        assert!(!heartbeat.is_stale(Duration::from_secs(1)));
        assert_eq!(heartbeat.beats(), 0);
    }

    #[test]
    fn test_beat_resets_staleness() {
        let heartbeat = Heartbeat::new("test");
        thread::sleep(Duration::from_millis(60));
        assert!(heartbeat.is_stale(Duration::from_millis(30)));

        heartbeat.beat();
        assert!(!heartbeat.is_stale(Duration::from_millis(30)));
        assert_eq!(heartbeat.beats(), 1);
    }
}
