//! config.rs
//! Runtime configuration: loop timing, watchdog thresholds and network ports.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! the standard robot setup. `validate` runs before anything is constructed.

use std::{fs, net::Ipv4Addr, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::network::{GAME_CONTROLLER_PORT, IMAGE_STREAM_PORT, JOB_PORT, TEAM_PORT};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub robot_number: u8,
    pub team_number: u8,
    /// Sense-act period when the loop is self-clocked.
    pub sense_act_period_ms: u64,
    /// See-think period when the orchestrator drives it with a periodic sleep.
    pub see_think_period_ms: u64,
    /// In stepped mode see-think runs on every Nth step.
    pub see_think_ratio: u32,
    /// Sleep after the actuator kill so the command reaches the hardware.
    pub shutdown_grace_ms: u64,
    pub realtime_priority: bool,
    pub pin_core: Option<usize>,
    pub cycle_log: Option<PathBuf>,
    /// Install the fatal-signal handlers and panic hook. Process-wide.
    pub fault_handlers: bool,
    pub watchdog: WatchdogConfig,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            robot_number: 1,
            team_number: 1,
            sense_act_period_ms: 20,
            see_think_period_ms: 33,
            see_think_ratio: 2,
            shutdown_grace_ms: 1500,
            realtime_priority: false,
            pin_core: None,
            cycle_log: None,
            fault_handlers: true,
            watchdog: WatchdogConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WatchdogConfig {
    pub period_ms: u64,
    /// A loop whose last progress is older than this is stalled.
    pub staleness_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            staleness_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    pub enabled: bool,
    pub port: u16,
}

impl PortConfig {
    pub fn enabled(port: u16) -> Self {
        Self {
            enabled: true,
            port,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            port: 0,
        }
    }

    /// The port number if the feature is on.
    pub fn active(&self) -> Option<u16> {
        self.enabled.then_some(self.port)
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub bind_address: Ipv4Addr,
    pub broadcast_address: Ipv4Addr,
    pub game_controller: PortConfig,
    pub team: PortConfig,
    pub jobs: PortConfig,
    pub image_stream: PortConfig,
    pub team_send_period_ms: u64,
    /// Teammates silent for longer than this are forgotten.
    pub team_peer_timeout_ms: u64,
    /// Send the Jobs emitted by see-think to the job port as well.
    pub mirror_jobs: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            broadcast_address: Ipv4Addr::BROADCAST,
            game_controller: PortConfig::enabled(GAME_CONTROLLER_PORT),
            team: PortConfig::enabled(TEAM_PORT),
            jobs: PortConfig::enabled(JOB_PORT),
            image_stream: PortConfig::enabled(IMAGE_STREAM_PORT),
            team_send_period_ms: 200,
            team_peer_timeout_ms: 2000,
            mirror_jobs: false,
        }
    }
}

impl NetworkConfig {
    /// Every port off.
    pub fn offline() -> Self {
        Self {
            game_controller: PortConfig::disabled(),
            team: PortConfig::disabled(),
            jobs: PortConfig::disabled(),
            image_stream: PortConfig::disabled(),
            ..Self::default()
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: RuntimeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::Invalid(msg));

        if self.robot_number == 0 {
            return invalid("robot_number must be at least 1".into());
        }
        for (name, value) in [
            ("sense_act_period_ms", self.sense_act_period_ms),
            ("see_think_period_ms", self.see_think_period_ms),
            ("watchdog.period_ms", self.watchdog.period_ms),
            ("network.team_send_period_ms", self.network.team_send_period_ms),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be greater than zero"));
            }
        }
        if self.see_think_ratio == 0 {
            return invalid("see_think_ratio must be at least 1".into());
        }
        if self.watchdog.staleness_ms <= self.sense_act_period_ms {
            return invalid(format!(
                "watchdog.staleness_ms ({}) must exceed sense_act_period_ms ({})",
                self.watchdog.staleness_ms, self.sense_act_period_ms
            ));
        }
        Ok(())
    }

    pub fn sense_act_period(&self) -> Duration {
        Duration::from_millis(self.sense_act_period_ms)
    }

    pub fn see_think_period(&self) -> Duration {
        Duration::from_millis(self.see_think_period_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.network.jobs.active(), Some(JOB_PORT));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            robot_number = 3
            see_think_ratio = 4

            [watchdog]
            staleness_ms = 800

            [network.image_stream]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.robot_number, 3);
        assert_eq!(config.see_think_ratio, 4);
        assert_eq!(config.watchdog.staleness_ms, 800);
        assert_eq!(config.watchdog.period_ms, 100);
        assert_eq!(config.network.image_stream.active(), None);
    }

    #[test]
    fn test_validation_rejects_bad_timing() {
        let zero_ratio = RuntimeConfig {
            see_think_ratio: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            zero_ratio.validate(),
            Err(ConfigurationError::Invalid(_))
        ));

        let mut tight_watchdog = RuntimeConfig::default();
        tight_watchdog.watchdog.staleness_ms = tight_watchdog.sense_act_period_ms;
        assert!(tight_watchdog.validate().is_err());

        assert!(RuntimeConfig::from_toml_str("sense_act_period_ms = 0").is_err());
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("bogus = 1"),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuntimeConfig::from_toml_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Read { .. }));
    }
}
