//! sensors.rs
//! Latest sensor snapshot, written only by the sense phase.

use parking_lot::RwLock;

pub const JOINT_COUNT: usize = 22;

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    /// Platform time of the reading, milliseconds.
    pub time_ms: f64,
    pub joint_positions: [f32; JOINT_COUNT],
    /// Cumulative chest button presses since boot.
    pub chest_presses: u32,
    /// Charge fraction in `[0, 1]`.
    pub battery: f32,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            time_ms: 0.0,
            joint_positions: [0.0; JOINT_COUNT],
            chest_presses: 0,
            battery: 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SensorsData {
    latest: RwLock<SensorSnapshot>,
}

impl SensorsData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, snapshot: SensorSnapshot) {
        *self.latest.write() = snapshot;
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.latest.read().clone()
    }

    pub fn time_ms(&self) -> f64 {
        self.latest.read().time_ms
    }

    pub fn chest_presses(&self) -> u32 {
        self.latest.read().chest_presses
    }

    pub fn battery(&self) -> f32 {
        self.latest.read().battery
    }
}
