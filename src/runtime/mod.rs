//! runtime
//! The NuBot orchestrator: owns the platform binding, Blackboard, network
//! façade, modules and threads, and drives them through their lifecycle.
//!
//! Lifecycle: `new()` builds everything and starts the loops (Running),
//! `run()` drives them until shutdown is requested, `shutdown()` safes the
//! robot and tears everything down in reverse order (Terminated).
//!
//! With a stepping platform the orchestrator advances the platform and runs
//! sense-act every step and see-think every `see_think_ratio` steps, waiting
//! on both. Otherwise sense-act clocks itself, see-think is released on a
//! periodic sleep, and a watchdog monitors both loops.

pub mod emergency;
pub mod fault;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use crossbeam::channel;
use log::{error, info, warn};
use parking_lot::Mutex;

use crate::blackboard::{Blackboard, FieldObjects, GameInformation, Sound, TeamInformation};
use crate::config::RuntimeConfig;
use crate::error::{BlackboardError, ConfigurationError, RuntimeError};
use crate::jobs::JobList;
use crate::modules::Modules;
use crate::network::{Clock, NetworkIo};
use crate::platform::Platform;
use crate::threads::{
    CycleLoop, FORWARD_CAPACITY, Heartbeat, LoopOptions, PeriodicSleep, Schedule, SeeThink, SenseAct,
    SharedMotion, Watchdog,
};
use crate::utils::{cycle_log::CycleLog, metrics::SharedLoopMetrics};

pub use emergency::{Emergency, FaultCause};
pub use fault::FaultGuard;

/// How often a blocked orchestrator re-checks for a shutdown request.
const WAIT_POLL: Duration = Duration::from_millis(50);
const MOTION_KILL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// The platform drives the cycle through `step()`.
    Stepped,
    /// Wall-clock loops with watchdog supervision.
    FreeRunning,
}

/// Ask a running NuBot to stop. Cheap to clone, usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct NuBot {
    config: RuntimeConfig,
    mode: RunMode,
    state: LifecycleState,
    platform: Arc<dyn Platform>,
    blackboard: Arc<Blackboard>,
    io: Option<Arc<NetworkIo>>,
    motion: Option<SharedMotion>,
    fault_guard: Option<FaultGuard>,
    cycle_log: Option<CycleLog>,
    sense_act: Option<CycleLoop>,
    see_think: Option<CycleLoop>,
    watchdog: Option<CycleLoop>,
    watchdog_armed: Option<Arc<AtomicBool>>,
    watchdog_trips: Arc<AtomicU64>,
    shutdown: ShutdownHandle,
}

impl NuBot {
    /// Build the runtime around `platform` and start its loops.
    ///
    /// `build_modules` receives the populated Blackboard; a module that
    /// cannot find its data fails construction.
    pub fn new<F>(
        platform: Arc<dyn Platform>,
        config: RuntimeConfig,
        build_modules: F,
    ) -> Result<Self, RuntimeError>
    where
        F: FnOnce(&Blackboard) -> Result<Modules, BlackboardError>,
    {
        config.validate()?;
        let mode = if platform.has_stepping_authority() {
            RunMode::Stepped
        } else {
            RunMode::FreeRunning
        };
        info!(
            "NuBot: robot {} team {}, {:?}",
            platform.robot_number(),
            platform.team_number(),
            mode
        );

        let blackboard = Arc::new(create_blackboard(platform.as_ref())?);

        let clock: Clock = {
            let platform = Arc::clone(&platform);
            Arc::new(move || platform.time_ms())
        };
        let cycle_log = config.cycle_log.as_ref().and_then(|path| {
            let log = CycleLog::new();
            match log.start_consumer(path.clone()) {
                Ok(()) => Some(log),
                Err(e) => {
                    warn!("NuBot: cycle log disabled, cannot write {}: {e}", path.display());
                    None
                }
            }
        });

        let opened = NetworkIo::new(&config.network, &blackboard, clock, cycle_log.clone())
            .map_err(RuntimeError::from)
            .and_then(|io| Ok((io, build_modules(&blackboard)?)));
        let (io, modules) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                stop_cycle_log(&cycle_log);
                return Err(e);
            }
        };
        let io = Arc::new(io);
        info!("NuBot: see-think modules {:?}", modules.see_think_names());
        let motion: Option<SharedMotion> = modules.motion.map(|m| Arc::new(Mutex::new(m)));

        let emergency = Arc::new(Emergency::new(
            Arc::clone(&platform),
            motion.clone(),
            config.shutdown_grace(),
        ));
        let fault_guard = if config.fault_handlers {
            match FaultGuard::install(Arc::clone(&emergency), config.shutdown_grace()) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    stop_cycle_log(&cycle_log);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let (forward_tx, forward_rx) = channel::bounded(FORWARD_CAPACITY);
        let jobs = blackboard.jobs()?;

        let sense_act = CycleLoop::spawn(
            LoopOptions {
                name: "sense-act",
                schedule: match mode {
                    RunMode::Stepped => Schedule::Triggered,
                    RunMode::FreeRunning => Schedule::Periodic(config.sense_act_period()),
                },
                realtime_priority: config.realtime_priority,
                core: config.pin_core,
                cycle_log: cycle_log.clone(),
            },
            SenseAct::new(
                Arc::clone(&platform),
                Arc::clone(&jobs),
                motion.clone(),
                forward_tx,
            ),
        )?;

        let see_think = CycleLoop::spawn(
            LoopOptions {
                cycle_log: cycle_log.clone(),
                ..LoopOptions::triggered("see-think")
            },
            SeeThink::new(
                Arc::clone(&platform),
                modules.see_think,
                forward_rx,
                jobs,
                Arc::clone(&io),
            )
            .with_mirrored_jobs(config.network.mirror_jobs),
        )?;

        let shutdown = ShutdownHandle::default();
        let mut watchdog_trips = Arc::new(AtomicU64::new(0));
        let mut watchdog_armed = None;
        let watchdog = match mode {
            RunMode::Stepped => None,
            RunMode::FreeRunning => {
                let stall_emergency = Arc::clone(&emergency);
                let stall_shutdown = shutdown.clone();
                let dog = Watchdog::new(
                    Duration::from_millis(config.watchdog.staleness_ms),
                    Box::new(move |heartbeat: &Heartbeat, silent: Duration| {
                        stall_emergency.engage(&FaultCause::LivenessTimeout {
                            loop_name: heartbeat.name(),
                            stalled_for: silent,
                        });
                        stall_shutdown.request();
                    }),
                )
                .watch(sense_act.heartbeat())
                .watch(see_think.heartbeat())
                .with_cycle_log(cycle_log.clone());
                watchdog_trips = dog.trips();
                watchdog_armed = Some(dog.armed());
                Some(CycleLoop::spawn(
                    LoopOptions {
                        cycle_log: cycle_log.clone(),
                        ..LoopOptions::periodic(
                            "watchdog",
                            Duration::from_millis(config.watchdog.period_ms),
                        )
                    },
                    dog,
                )?)
            }
        };

        platform.actuators().add_sound(Sound::Startup);
        info!("NuBot: running");
        Ok(Self {
            config,
            mode,
            state: LifecycleState::Running,
            platform,
            blackboard,
            io: Some(io),
            motion,
            fault_guard,
            cycle_log,
            sense_act: Some(sense_act),
            see_think: Some(see_think),
            watchdog,
            watchdog_armed,
            watchdog_trips,
            shutdown,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn blackboard(&self) -> Arc<Blackboard> {
        Arc::clone(&self.blackboard)
    }

    pub fn network(&self) -> Option<&NetworkIo> {
        self.io.as_deref()
    }

    /// Stall episodes the watchdog has acted on.
    pub fn watchdog_trips(&self) -> u64 {
        self.watchdog_trips.load(Ordering::Relaxed)
    }

    pub fn loop_metrics(&self, name: &str) -> Option<SharedLoopMetrics> {
        [&self.sense_act, &self.see_think, &self.watchdog]
            .into_iter()
            .flatten()
            .find(|lp| lp.name() == name)
            .map(|lp| lp.metrics())
    }

    /// Drive the loops until shutdown is requested, then shut down.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        if self.state != LifecycleState::Running {
            return Ok(());
        }
        self.arm_watchdog();

        let result = match self.mode {
            RunMode::Stepped => self.run_stepped(),
            RunMode::FreeRunning => self.run_free_running(),
        };
        if let Err(e) = &result {
            error!("NuBot: run loop failed: {e}");
        }
        self.shutdown();
        result
    }

    fn arm_watchdog(&self) {
        let Some(armed) = &self.watchdog_armed else {
            return;
        };
        for lp in [&self.sense_act, &self.see_think].into_iter().flatten() {
            lp.heartbeat().beat();
        }
        armed.store(true, Ordering::Release);
    }

    fn run_stepped(&self) -> Result<(), RuntimeError> {
        let (Some(sense_act), Some(see_think)) = (&self.sense_act, &self.see_think) else {
            return Ok(());
        };
        let ratio = u64::from(self.config.see_think_ratio);
        let mut count: u64 = 0;

        while !self.shutdown.is_requested() {
            self.platform.step();
            sense_act.start_loop()?;
            if count % ratio == 0 {
                see_think.start_loop()?;
                if !self.wait_for(see_think)? {
                    break;
                }
            }
            if !self.wait_for(sense_act)? {
                break;
            }
            count += 1;
        }
        info!("NuBot: stepped run ended after {count} steps");
        Ok(())
    }

    fn run_free_running(&self) -> Result<(), RuntimeError> {
        let Some(see_think) = &self.see_think else {
            return Ok(());
        };
        let mut pacer = PeriodicSleep::new(self.config.see_think_period());

        while !self.shutdown.is_requested() {
            pacer.sleep();
            if self.shutdown.is_requested() {
                break;
            }
            see_think.start_loop()?;
            if !self.wait_for(see_think)? {
                break;
            }
        }
        Ok(())
    }

    /// `Ok(false)` when shutdown was requested before the cycle finished.
    fn wait_for(&self, lp: &CycleLoop) -> Result<bool, RuntimeError> {
        loop {
            if lp.wait_for_loop_completion_timeout(WAIT_POLL)? {
                return Ok(true);
            }
            if self.shutdown.is_requested() {
                return Ok(false);
            }
        }
    }

    /// Safe the robot and tear everything down. Idempotent.
    pub fn shutdown(&mut self) {
        if matches!(
            self.state,
            LifecycleState::ShuttingDown | LifecycleState::Terminated
        ) {
            return;
        }
        self.state = LifecycleState::ShuttingDown;
        self.shutdown.request();
        info!("NuBot: shutting down");

        if let Some(armed) = &self.watchdog_armed {
            armed.store(false, Ordering::Release);
        }

        if let Some(motion) = &self.motion {
            match motion.try_lock_for(MOTION_KILL_TIMEOUT) {
                Some(mut motion) => motion.kill(),
                None => warn!("NuBot: motion busy, relying on platform kill"),
            }
        }
        self.platform.actuators().add_sound(Sound::Shutdown);
        self.platform.kill();
        self.platform.apply_actuators();
        let grace_ms = self.config.shutdown_grace_ms;
        if grace_ms > 0 {
            self.platform.msleep(grace_ms);
        }

        for slot in [&mut self.see_think, &mut self.sense_act, &mut self.watchdog] {
            if let Some(mut lp) = slot.take() {
                lp.stop();
                log_summary(&lp);
            }
        }

        drop(self.motion.take());
        drop(self.io.take());
        if let Some(log) = self.cycle_log.take() {
            log.stop_consumer();
            if log.dropped() > 0 {
                warn!("NuBot: cycle log dropped {} events", log.dropped());
            }
        }
        self.blackboard.teardown();
        drop(self.fault_guard.take());

        self.state = LifecycleState::Terminated;
        info!("NuBot: terminated");
    }
}

impl Drop for NuBot {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Platform storage first, then the shared data owned by the runtime.
fn create_blackboard(platform: &dyn Platform) -> Result<Blackboard, ConfigurationError> {
    let blackboard = Blackboard::new();
    blackboard.add(platform.sensors())?;
    blackboard.add(platform.actuators())?;
    blackboard.add(Arc::new(FieldObjects::new()))?;
    blackboard.add(Arc::new(JobList::new()))?;
    blackboard.add(Arc::new(GameInformation::new(
        platform.robot_number(),
        platform.team_number(),
    )))?;
    blackboard.add(Arc::new(TeamInformation::new(
        platform.robot_number(),
        platform.team_number(),
    )))?;
    Ok(blackboard)
}

fn stop_cycle_log(cycle_log: &Option<CycleLog>) {
    if let Some(log) = cycle_log {
        log.stop_consumer();
    }
}

fn log_summary(lp: &CycleLoop) {
    let metrics = lp.metrics();
    let metrics = metrics.lock();
    match metrics.cycle_stats() {
        Some(stats) => info!(
            "{}: {} cycles, {} overruns, cycle time mean {:.1} us max {:.1} us",
            lp.name(),
            metrics.total_cycles,
            metrics.overruns,
            stats.mean,
            stats.max
        ),
        None => info!("{}: no cycles run", lp.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Role;
    use crate::platform::SimulatedPlatform;

    fn quiet_config() -> RuntimeConfig {
        RuntimeConfig {
            shutdown_grace_ms: 0,
            fault_handlers: false,
            network: crate::config::NetworkConfig::offline(),
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn test_blackboard_complete_after_construction() {
        let platform = Arc::new(SimulatedPlatform::stepped(2, 5, 10));
        let bot = NuBot::new(platform, quiet_config(), Modules::standard).unwrap();
        let board = bot.blackboard();
        assert!(board.is_complete());
        assert_eq!(board.game_info().unwrap().robot_number(), 2);
        assert_eq!(bot.state(), LifecycleState::Running);
        assert_eq!(bot.mode(), RunMode::Stepped);
    }

    #[test]
    fn test_failing_module_factory_aborts_construction() {
        let platform = Arc::new(SimulatedPlatform::new(1, 1));
        let result = NuBot::new(platform, quiet_config(), |_| {
            Err(BlackboardError::Unregistered(Role::Sensors))
        });
        assert!(matches!(
            result,
            Err(RuntimeError::Blackboard(BlackboardError::Unregistered(Role::Sensors)))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let platform = Arc::new(SimulatedPlatform::new(1, 1));
        let config = RuntimeConfig {
            see_think_ratio: 0,
            ..quiet_config()
        };
        assert!(matches!(
            NuBot::new(platform, config, Modules::standard),
            Err(RuntimeError::Configuration(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let platform = Arc::new(SimulatedPlatform::new(1, 1));
        let mut bot = NuBot::new(
            Arc::clone(&platform) as Arc<dyn Platform>,
            quiet_config(),
            Modules::standard,
        )
        .unwrap();
        bot.shutdown();
        bot.shutdown();
        assert_eq!(bot.state(), LifecycleState::Terminated);
        assert_eq!(platform.kill_count(), 1);
        assert!(bot.blackboard().is_torn_down());
        assert!(bot.run().is_ok());
    }
}
