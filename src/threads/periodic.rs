//! periodic.rs
//! Sleep out the rest of a period measured from the previous release.

use std::time::{Duration, Instant};

use spin_sleep::{SpinSleeper, SpinStrategy};

pub struct PeriodicSleep {
    period: Duration,
    last_release: Option<Instant>,
    sleeper: SpinSleeper,
}

impl PeriodicSleep {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_release: None,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until one period has passed since the previous call returned.
    /// Returns immediately on the first call or if the period already elapsed.
    pub fn sleep(&mut self) {
        if let Some(last) = self.last_release {
            let remaining = remaining(self.period, last.elapsed());
            if !remaining.is_zero() {
                self.sleeper.sleep(remaining);
            }
        }
        self.last_release = Some(Instant::now());
    }
}

/// Time left in `period` after `elapsed`, never negative.
pub fn remaining(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}
