//! watchdog.rs
//! Liveness monitor for the work loops.
//!
//! Each check compares every monitored heartbeat against the staleness
//! threshold. A stall episode starts when any heartbeat goes stale and ends
//! once every heartbeat is fresh again; the stall callback runs once per
//! episode, however many loops stall within it. The watchdog can be
//! disarmed (during shutdown the loops stop on purpose).

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{error, info};

use crate::threads::{cycle_loop::LoopBody, heartbeat::Heartbeat};
use crate::utils::cycle_log::{CycleEventKind, CycleLog};

/// Called with the stalled heartbeat and how long it has been silent.
pub type StallHandler = Box<dyn FnMut(&Heartbeat, Duration) + Send>;

struct Watched {
    heartbeat: Arc<Heartbeat>,
    tripped: bool,
}

pub struct Watchdog {
    watched: Vec<Watched>,
    staleness: Duration,
    armed: Arc<AtomicBool>,
    trips: Arc<AtomicU64>,
    in_episode: bool,
    on_stall: StallHandler,
    cycle_log: Option<CycleLog>,
}

impl Watchdog {
    /// Starts disarmed.
    pub fn new(staleness: Duration, on_stall: StallHandler) -> Self {
        Self {
            watched: Vec::new(),
            staleness,
            armed: Arc::new(AtomicBool::new(false)),
            trips: Arc::new(AtomicU64::new(0)),
            in_episode: false,
            on_stall,
            cycle_log: None,
        }
    }

    /// Record each stalled loop as a `Stall` event.
    pub fn with_cycle_log(mut self, cycle_log: Option<CycleLog>) -> Self {
        self.cycle_log = cycle_log;
        self
    }

    pub fn watch(mut self, heartbeat: Arc<Heartbeat>) -> Self {
        self.watched.push(Watched {
            heartbeat,
            tripped: false,
        });
        self
    }

    /// Shared flag; clear it to suspend tripping.
    pub fn armed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.armed)
    }

    /// Shared count of stall episodes acted on.
    pub fn trips(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.trips)
    }

    /// One pass over the heartbeats. Returns how many loops newly stalled.
    pub fn check(&mut self) -> usize {
        if !self.armed.load(Ordering::Acquire) {
            return 0;
        }

        let mut new_stalls = 0;
        let mut first_stall: Option<(usize, Duration)> = None;
        for (index, watched) in self.watched.iter_mut().enumerate() {
            let silent = watched.heartbeat.since_last_beat();
            if silent <= self.staleness {
                if watched.tripped {
                    info!("watchdog: {} recovered", watched.heartbeat.name());
                }
                watched.tripped = false;
                continue;
            }
            if watched.tripped {
                continue;
            }

            watched.tripped = true;
            new_stalls += 1;
            error!(
                "watchdog: {} loop stalled, no progress for {} ms",
                watched.heartbeat.name(),
                silent.as_millis()
            );
            if let Some(log) = &self.cycle_log {
                log.record(
                    watched.heartbeat.name(),
                    CycleEventKind::Stall,
                    silent.as_secs_f64() * 1e3,
                );
            }
            if first_stall.is_none() {
                first_stall = Some((index, silent));
            }
        }

        if !self.watched.iter().any(|w| w.tripped) {
            self.in_episode = false;
        }
        if let Some((index, silent)) = first_stall {
            if !self.in_episode {
                self.in_episode = true;
                self.trips.fetch_add(1, Ordering::Relaxed);
                (self.on_stall)(&self.watched[index].heartbeat, silent);
            }
        }
        new_stalls
    }
}

impl LoopBody for Watchdog {
    fn cycle(&mut self) {
        self.check();
    }
}
