//! Fatal-signal path through a running NuBot. Fault handlers are process
//! wide, so these tests run one at a time.

use std::{sync::Arc, time::Duration};

use serial_test::serial;

use nubot_runtime::{
    Modules, NuBot, Platform, RuntimeConfig, SimulatedPlatform, blackboard::Sound,
    config::NetworkConfig, runtime::fault,
};

fn config() -> RuntimeConfig {
    RuntimeConfig {
        shutdown_grace_ms: 0,
        fault_handlers: true,
        network: NetworkConfig::offline(),
        ..RuntimeConfig::default()
    }
}

#[test]
#[serial]
fn signal_safes_robot_with_matching_sound() {
    let platform = Arc::new(SimulatedPlatform::new(1, 1));
    let mut bot = NuBot::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        config(),
        Modules::standard,
    )
    .unwrap();

    assert!(fault::request_safing(libc::SIGBUS));
    assert_eq!(platform.kill_count(), 1);
    assert!(platform.played_sounds().contains(&Sound::BusError));
    assert!(platform.actuators().is_frozen());

    bot.shutdown();
}

#[test]
#[serial]
fn handlers_reinstall_after_shutdown() {
    for _ in 0..2 {
        let platform = Arc::new(SimulatedPlatform::new(1, 1));
        let bot = NuBot::new(
            Arc::clone(&platform) as Arc<dyn Platform>,
            config(),
            Modules::standard,
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(bot);
        assert_eq!(platform.kill_count(), 1);
    }
}

#[test]
#[serial]
fn second_runtime_cannot_claim_handlers() {
    let first = NuBot::new(
        Arc::new(SimulatedPlatform::new(1, 1)),
        config(),
        Modules::standard,
    )
    .unwrap();
    let second = NuBot::new(
        Arc::new(SimulatedPlatform::new(2, 1)),
        config(),
        Modules::standard,
    );
    assert!(matches!(
        second,
        Err(nubot_runtime::RuntimeError::FaultHandling(_))
    ));
    drop(first);
}
