//! cycle_loop.rs
//! A named work loop on its own OS thread.
//!
//! Two schedules:
//! - `Triggered`: each cycle waits for `start_loop()`; the orchestrator then
//!   blocks in `wait_for_loop_completion()` until the cycle is done.
//! - `Periodic`: the loop clocks itself with a spin sleeper (as the sensor
//!   threads did) and signals completion after every cycle.
//!
//! The handshake is a pair of capacity-1 channels per loop. Stopping is
//! cooperative: the stop flag is checked at the top of every iteration and
//! the receive side polls with a short timeout, then the thread is joined.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::error::RuntimeError;
use crate::threads::heartbeat::Heartbeat;
use crate::utils::{
    cycle_log::{CycleEventKind, CycleLog},
    metrics::{LoopMetrics, SharedLoopMetrics},
};

const POLL: Duration = Duration::from_millis(100);

/// The work done once per cycle, on the loop thread.
pub trait LoopBody: Send + 'static {
    fn cycle(&mut self);

    /// Called on the loop thread after the last cycle.
    fn finish(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Triggered,
    Periodic(Duration),
}

#[derive(Clone)]
pub struct LoopOptions {
    pub name: &'static str,
    pub schedule: Schedule,
    pub realtime_priority: bool,
    pub core: Option<usize>,
    pub cycle_log: Option<CycleLog>,
}

impl LoopOptions {
    pub fn triggered(name: &'static str) -> Self {
        Self {
            name,
            schedule: Schedule::Triggered,
            realtime_priority: false,
            core: None,
            cycle_log: None,
        }
    }

    pub fn periodic(name: &'static str, period: Duration) -> Self {
        Self {
            schedule: Schedule::Periodic(period),
            ..Self::triggered(name)
        }
    }
}

pub struct CycleLoop {
    name: &'static str,
    schedule: Schedule,
    trigger_tx: Sender<()>,
    done_rx: Receiver<()>,
    running: Arc<AtomicBool>,
    heartbeat: Arc<Heartbeat>,
    metrics: SharedLoopMetrics,
    handle: Option<JoinHandle<()>>,
}

struct LoopThread {
    name: &'static str,
    schedule: Schedule,
    core: Option<usize>,
    trigger_rx: Receiver<()>,
    done_tx: Sender<()>,
    running: Arc<AtomicBool>,
    heartbeat: Arc<Heartbeat>,
    metrics: SharedLoopMetrics,
    cycle_log: Option<CycleLog>,
}

impl CycleLoop {
    pub fn spawn<B: LoopBody>(options: LoopOptions, body: B) -> Result<Self, RuntimeError> {
        let (trigger_tx, trigger_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let heartbeat = Arc::new(Heartbeat::new(options.name));
        let metrics = LoopMetrics::shared();

        let worker = LoopThread {
            name: options.name,
            schedule: options.schedule,
            core: options.core,
            trigger_rx,
            done_tx,
            running: Arc::clone(&running),
            heartbeat: Arc::clone(&heartbeat),
            metrics: Arc::clone(&metrics),
            cycle_log: options.cycle_log,
        };

        let builder = thread::Builder::new().name(options.name.to_string());
        let spawned = if options.realtime_priority {
            builder.spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    warn!("{}: running without realtime priority: {e:?}", worker.name);
                }
                worker.run(body);
            })
        } else {
            builder.spawn(move || worker.run(body))
        };
        let handle = spawned.map_err(|source| RuntimeError::Spawn {
            name: options.name,
            source,
        })?;

        info!("{}: started ({:?})", options.name, options.schedule);
        Ok(Self {
            name: options.name,
            schedule: options.schedule,
            trigger_tx,
            done_rx,
            running,
            heartbeat,
            metrics,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        Arc::clone(&self.heartbeat)
    }

    pub fn metrics(&self) -> SharedLoopMetrics {
        Arc::clone(&self.metrics)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Release one cycle. Never blocks; a trigger already pending absorbs this one.
    /// Self-clocked loops ignore it.
    pub fn start_loop(&self) -> Result<(), RuntimeError> {
        if let Schedule::Periodic(_) = self.schedule {
            return Ok(());
        }
        self.discard_stale_completion();
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(RuntimeError::LoopStopped(self.name)),
        }
    }

    /// Block until the current cycle finishes.
    pub fn wait_for_loop_completion(&self) -> Result<(), RuntimeError> {
        self.done_rx
            .recv()
            .map_err(|_| RuntimeError::LoopStopped(self.name))
    }

    /// As `wait_for_loop_completion`, giving up after `timeout`. `Ok(false)` on timeout.
    pub fn wait_for_loop_completion_timeout(&self, timeout: Duration) -> Result<bool, RuntimeError> {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(RuntimeError::LoopStopped(self.name)),
        }
    }

    fn discard_stale_completion(&self) {
        while let Ok(()) = self.done_rx.try_recv() {}
    }

    /// Stop after the current cycle and join. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            error!("{}: loop thread panicked", self.name);
        } else {
            debug!("{}: stopped", self.name);
        }
    }
}

impl Drop for CycleLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LoopThread {
    fn run<B: LoopBody>(self, mut body: B) {
        if let Some(core) = self.core {
            pin_to_core(self.name, core);
        }

        match self.schedule {
            Schedule::Triggered => self.run_triggered(&mut body),
            Schedule::Periodic(period) => self.run_periodic(&mut body, period),
        }
        body.finish();
    }

    fn run_triggered<B: LoopBody>(&self, body: &mut B) {
        while self.running.load(Ordering::Acquire) {
            match self.trigger_rx.recv_timeout(POLL) {
                Ok(()) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    self.run_cycle(body, None);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn run_periodic<B: LoopBody>(&self, body: &mut B, period: Duration) {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_release = Instant::now() + period;

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_release {
                sleeper.sleep(next_release - now);
            } else {
                let late = now - next_release;
                self.metrics.lock().record_jitter(late);
                if let Some(log) = &self.cycle_log {
                    log.record(self.name, CycleEventKind::Overrun, late.as_secs_f64() * 1e6);
                }
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            self.run_cycle(body, Some(period));

            next_release += period;
            let now = Instant::now();
            if next_release < now {
                // Skip missed releases rather than bursting to catch up.
                next_release = now;
            }
        }
    }

    fn run_cycle<B: LoopBody>(&self, body: &mut B, period: Option<Duration>) {
        let start = Instant::now();
        body.cycle();
        let elapsed = start.elapsed();

        self.heartbeat.beat();
        self.metrics.lock().record_cycle(elapsed, period);
        if let Some(log) = &self.cycle_log {
            log.record(self.name, CycleEventKind::Cycle, elapsed.as_secs_f64() * 1e6);
        }

        // A full slot means nobody collected the previous completion yet.
        let _ = self.done_tx.try_send(());
    }
}

fn pin_to_core(name: &str, core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            info!("{name}: pinned to core {core}");
        }
        Some(_) => error!("{name}: failed to pin to core {core}"),
        None => error!("{name}: core {core} not available"),
    }
}
