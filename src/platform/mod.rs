//! platform
//! Hardware boundary: sensor/actuator storage, identity, clock and kill switch.
//!
//! The trait is object safe; the orchestrator holds an `Arc<dyn Platform>`
//! shared with the loop threads and the emergency path.

pub mod sim;

use std::{sync::Arc, time::Duration};

use crate::blackboard::{ActuatorsData, SensorsData};

pub use sim::SimulatedPlatform;

pub trait Platform: Send + Sync {
    /// Storage the platform writes sensor readings into.
    fn sensors(&self) -> Arc<SensorsData>;

    /// Storage the platform reads actuator commands from.
    fn actuators(&self) -> Arc<ActuatorsData>;

    fn robot_number(&self) -> u8;

    fn team_number(&self) -> u8;

    /// Platform clock in milliseconds.
    fn time_ms(&self) -> f64;

    fn msleep(&self, ms: u64) {
        spin_sleep::sleep(Duration::from_millis(ms));
    }

    /// Remove stiffness and stop every actuator. Must be safe to call
    /// from any thread at any time, more than once.
    fn kill(&self);

    /// Refresh `sensors()` from the hardware.
    fn update_sensors(&self);

    /// Push `actuators()` to the hardware.
    fn apply_actuators(&self);

    /// Advance simulated time by one step. Only meaningful with stepping authority.
    fn step(&self) {}

    /// True when the platform, not wall time, drives the control cycle.
    fn has_stepping_authority(&self) -> bool {
        false
    }
}
