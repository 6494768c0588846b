//! Whole-runtime runs on the simulated platform: stepped scheduling,
//! network Jobs reaching the actuators, watchdog safing, orderly shutdown.

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use nubot_runtime::{
    BlackboardError, LifecycleState, Modules, NuBot, Platform, RunMode, RuntimeConfig,
    SimulatedPlatform,
    blackboard::Sound,
    config::{NetworkConfig, PortConfig},
    jobs::{Job, JobList},
    modules::{SeeThinkContext, SeeThinkModule},
    network::{job_port::JobPort, udp_port::UdpPortOptions},
};

fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        shutdown_grace_ms: 0,
        fault_handlers: false,
        network: NetworkConfig::offline(),
        ..RuntimeConfig::default()
    }
}

fn stop_after(handle: nubot_runtime::ShutdownHandle, delay: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(delay);
        handle.request();
    })
}

/// Counts its own cycles.
struct Tally(Arc<AtomicU64>);

impl SeeThinkModule for Tally {
    fn name(&self) -> &'static str {
        "tally"
    }

    fn process(&mut self, _ctx: &mut SeeThinkContext<'_>) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn stepped_run_honours_see_think_ratio() {
    let platform = Arc::new(SimulatedPlatform::stepped(1, 1, 10));
    let see_think_cycles = Arc::new(AtomicU64::new(0));
    let tally = Arc::clone(&see_think_cycles);

    let mut bot = NuBot::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        RuntimeConfig {
            see_think_ratio: 3,
            ..test_config()
        },
        move |board| {
            let mut modules = Modules::standard(board)?;
            modules.see_think.push(Box::new(Tally(tally)));
            Ok::<_, BlackboardError>(modules)
        },
    )
    .unwrap();
    assert_eq!(bot.mode(), RunMode::Stepped);

    let stopper = stop_after(bot.shutdown_handle(), Duration::from_millis(300));
    bot.run().unwrap();
    stopper.join().unwrap();

    let steps = platform.step_count();
    let see_think = see_think_cycles.load(Ordering::Relaxed);
    assert!(steps > 10, "only {steps} steps");
    // See-think runs on steps 0, 3, 6, ... so ceil(completed / 3), plus one in flight at most.
    let expected = steps.div_ceil(3);
    assert!(
        see_think.abs_diff(expected) <= 1,
        "steps {steps}, see-think {see_think}"
    );

    assert_eq!(bot.state(), LifecycleState::Terminated);
    assert!(platform.kill_count() >= 1);
    assert!(platform.played_sounds().contains(&Sound::Shutdown));
    assert!(bot.blackboard().jobs().is_err());
}

#[test]
fn network_walk_job_reaches_actuators() {
    let platform = Arc::new(SimulatedPlatform::stepped(1, 1, 10));
    let mut config = test_config();
    config.network.bind_address = Ipv4Addr::LOCALHOST;
    config.network.jobs = PortConfig::enabled(0);

    let mut bot = NuBot::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        config,
        Modules::standard,
    )
    .unwrap();
    let job_port = bot
        .network()
        .and_then(|io| io.jobs())
        .map(|jobs| jobs.udp().port())
        .unwrap();

    let walked = Arc::new(AtomicBool::new(false));
    let observer = {
        let platform = Arc::clone(&platform);
        let walked = Arc::clone(&walked);
        let shutdown = bot.shutdown_handle();
        thread::spawn(move || {
            let sender = JobPort::open(
                UdpPortOptions {
                    bind_address: Ipv4Addr::LOCALHOST,
                    port: 0,
                    target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, job_port),
                },
                Arc::new(JobList::new()),
            )
            .unwrap();
            sender.send(&[Job::walk(0.0, 3.0, 0.0, 0.0)]).unwrap();

            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                if platform
                    .last_applied()
                    .is_some_and(|applied| applied.walk.forward == 3.0)
                {
                    walked.store(true, Ordering::Release);
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            shutdown.request();
        })
    };

    bot.run().unwrap();
    observer.join().unwrap();
    assert!(walked.load(Ordering::Acquire));
}

/// Blocks once for `stall`, on its fifth cycle.
struct StallOnce {
    cycles: u64,
    stall: Duration,
}

impl SeeThinkModule for StallOnce {
    fn name(&self) -> &'static str {
        "stall-once"
    }

    fn process(&mut self, _ctx: &mut SeeThinkContext<'_>) {
        self.cycles += 1;
        if self.cycles == 5 {
            thread::sleep(self.stall);
        }
    }
}

#[test]
fn stalled_loop_trips_watchdog_once_and_stops() {
    let platform = Arc::new(SimulatedPlatform::new(1, 1));
    let mut config = RuntimeConfig {
        sense_act_period_ms: 10,
        see_think_period_ms: 20,
        ..test_config()
    };
    config.watchdog.period_ms = 20;
    config.watchdog.staleness_ms = 150;

    let mut bot = NuBot::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        config,
        |_board| {
            Ok(Modules {
                motion: None,
                see_think: vec![Box::new(StallOnce {
                    cycles: 0,
                    stall: Duration::from_millis(500),
                })],
            })
        },
    )
    .unwrap();
    assert_eq!(bot.mode(), RunMode::FreeRunning);

    // Backstop in case the watchdog never fires.
    let backstop = stop_after(bot.shutdown_handle(), Duration::from_secs(5));
    let started = Instant::now();
    bot.run().unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));

    assert_eq!(bot.watchdog_trips(), 1);
    assert!(platform.played_sounds().contains(&Sound::WatchdogTimeout));
    assert!(platform.kill_count() >= 2);
    assert_eq!(bot.state(), LifecycleState::Terminated);
    backstop.join().unwrap();
}

#[test]
fn healthy_free_running_loops_never_trip() {
    let platform = Arc::new(SimulatedPlatform::new(1, 1));
    let mut bot = NuBot::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        test_config(),
        Modules::standard,
    )
    .unwrap();

    let stopper = stop_after(bot.shutdown_handle(), Duration::from_millis(700));
    bot.run().unwrap();
    stopper.join().unwrap();

    assert_eq!(bot.watchdog_trips(), 0);
    assert!(!platform.played_sounds().contains(&Sound::WatchdogTimeout));
    assert!(platform.apply_count() > 10);
}
