//! metrics.rs
//! Per-loop timing statistics.
//!
//! Each work loop owns one `LoopMetrics` behind a `SharedLoopMetrics`. The loop
//! records its cycle time after every iteration; the orchestrator logs a
//! summary at shutdown. Buffers are bounded to the 1000 most recent points.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;

pub const MAX_POINTS: usize = 1_000;

#[derive(Debug, Default, Clone)]
pub struct LoopMetrics {
    /// Cycle durations in microseconds (last 1000 cycles).
    pub cycle_us: VecDeque<f64>,
    /// Lateness of each periodic release in microseconds (last 1000 releases).
    pub jitter_us: VecDeque<u64>,
    pub total_cycles: u64,
    /// Cycles that took longer than their period.
    pub overruns: u64,
}

pub type SharedLoopMetrics = Arc<Mutex<LoopMetrics>>;

impl LoopMetrics {
    pub fn shared() -> SharedLoopMetrics {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Record one completed cycle; `period` is `None` for triggered loops.
    pub fn record_cycle(&mut self, elapsed: Duration, period: Option<Duration>) {
        self.total_cycles += 1;
        push_capped(&mut self.cycle_us, elapsed.as_secs_f64() * 1e6);
        if period.is_some_and(|p| elapsed > p) {
            self.overruns += 1;
        }
    }

    pub fn record_jitter(&mut self, lateness: Duration) {
        push_capped_u64(&mut self.jitter_us, lateness.as_micros() as u64);
    }

    pub fn cycle_stats(&self) -> Option<Stats> {
        calculate_stats(&self.cycle_us)
    }

    pub fn jitter_stats(&self) -> Option<Stats> {
        calculate_stats_u64(&self.jitter_us)
    }
}

/// Appends value to metrics buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_capped_keeps_most_recent() {
        let mut buf = VecDeque::new();
        for i in 0..(MAX_POINTS + 5) {
            push_capped(&mut buf, i as f64);
        }
        assert_eq!(buf.len(), MAX_POINTS);
        assert_eq!(buf.front().copied(), Some(5.0));
    }

    #[test]
    fn test_overruns_only_counted_for_periodic() {
        let mut metrics = LoopMetrics::default();
        let period = Duration::from_millis(20);
        metrics.record_cycle(Duration::from_millis(5), Some(period));
        metrics.record_cycle(Duration::from_millis(25), Some(period));
        metrics.record_cycle(Duration::from_millis(25), None);

        assert_eq!(metrics.total_cycles, 3);
        assert_eq!(metrics.overruns, 1);
        let stats = metrics.cycle_stats().unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.max - 25_000.0).abs() < 1.0);
    }

    #[test]
    fn test_stats_empty() {
        assert!(calculate_stats(&VecDeque::new()).is_none());
        assert!(LoopMetrics::default().jitter_stats().is_none());
    }
}
