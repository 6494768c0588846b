//! sim.rs
//! In-process platform: joints follow their targets with a first-order lag
//! plus sensor noise, and everything the runtime sends to the "hardware"
//! is recorded for inspection.
//!
//! With `stepped(step_ms)` the platform has stepping authority and its clock
//! only advances on `step()`; otherwise it runs on wall time.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Instant,
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::random_range;

use crate::blackboard::{
    ActuatorTargets, ActuatorsData, JOINT_COUNT, SensorSnapshot, SensorsData, Sound,
};
use crate::platform::Platform;

/// Fraction of the remaining error closed per sensor update.
const JOINT_TRACKING_GAIN: f32 = 0.3;
const JOINT_NOISE: f32 = 0.002;
const BATTERY_DRAIN_PER_UPDATE: f32 = 1e-6;

#[derive(Debug, Default)]
struct HardwareLog {
    last_applied: Option<ActuatorTargets>,
    sounds: Vec<Sound>,
    applies: u64,
}

pub struct SimulatedPlatform {
    robot_number: u8,
    team_number: u8,
    sensors: Arc<SensorsData>,
    actuators: Arc<ActuatorsData>,
    start: Instant,
    step_ms: Option<u64>,
    sim_time_ms: AtomicU64,
    steps: AtomicU64,
    kills: AtomicU64,
    chest_presses: AtomicU32,
    joints: Mutex<[f32; JOINT_COUNT]>,
    battery: Mutex<f32>,
    hardware: Mutex<HardwareLog>,
}

impl SimulatedPlatform {
    /// Wall-clock platform without stepping authority.
    pub fn new(robot_number: u8, team_number: u8) -> Self {
        Self {
            robot_number,
            team_number,
            sensors: Arc::new(SensorsData::new()),
            actuators: Arc::new(ActuatorsData::new()),
            start: Instant::now(),
            step_ms: None,
            sim_time_ms: AtomicU64::new(0),
            steps: AtomicU64::new(0),
            kills: AtomicU64::new(0),
            chest_presses: AtomicU32::new(0),
            joints: Mutex::new([0.0; JOINT_COUNT]),
            battery: Mutex::new(1.0),
            hardware: Mutex::new(HardwareLog::default()),
        }
    }

    /// Simulator-style platform whose clock advances `step_ms` per `step()`.
    pub fn stepped(robot_number: u8, team_number: u8, step_ms: u64) -> Self {
        Self {
            step_ms: Some(step_ms.max(1)),
            ..Self::new(robot_number, team_number)
        }
    }

    /// Simulate a press of the chest button; seen on the next sensor update.
    pub fn press_chest_button(&self) {
        self.chest_presses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn kill_count(&self) -> u64 {
        self.kills.load(Ordering::Relaxed)
    }

    pub fn step_count(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn apply_count(&self) -> u64 {
        self.hardware.lock().applies
    }

    /// Every sound played so far, oldest first.
    pub fn played_sounds(&self) -> Vec<Sound> {
        self.hardware.lock().sounds.clone()
    }

    pub fn last_applied(&self) -> Option<ActuatorTargets> {
        self.hardware.lock().last_applied.clone()
    }
}

impl Platform for SimulatedPlatform {
    fn sensors(&self) -> Arc<SensorsData> {
        Arc::clone(&self.sensors)
    }

    fn actuators(&self) -> Arc<ActuatorsData> {
        Arc::clone(&self.actuators)
    }

    fn robot_number(&self) -> u8 {
        self.robot_number
    }

    fn team_number(&self) -> u8 {
        self.team_number
    }

    fn time_ms(&self) -> f64 {
        match self.step_ms {
            Some(_) => self.sim_time_ms.load(Ordering::Acquire) as f64,
            None => self.start.elapsed().as_secs_f64() * 1e3,
        }
    }

    fn kill(&self) {
        self.actuators.relax();
        let kills = self.kills.fetch_add(1, Ordering::Relaxed) + 1;
        info!("SimulatedPlatform: kill #{kills}, stiffness off");
    }

    fn update_sensors(&self) {
        let targets = self.actuators.targets();
        let mut joints = self.joints.lock();
        if targets.stiffness_on {
            for (joint, target) in joints.iter_mut().zip(targets.joint_targets.iter()) {
                *joint += (target - *joint) * JOINT_TRACKING_GAIN;
            }
        }
        let mut measured = *joints;
        drop(joints);
        for value in measured.iter_mut() {
            *value += random_range(-JOINT_NOISE..JOINT_NOISE);
        }

        let battery = {
            let mut battery = self.battery.lock();
            *battery = (*battery - BATTERY_DRAIN_PER_UPDATE).max(0.0);
            *battery
        };

        self.sensors.update(SensorSnapshot {
            time_ms: self.time_ms(),
            joint_positions: measured,
            chest_presses: self.chest_presses.load(Ordering::Relaxed),
            battery,
        });
    }

    fn apply_actuators(&self) {
        let targets = self.actuators.targets();
        let sounds = self.actuators.take_sounds();
        let mut hardware = self.hardware.lock();
        for sound in &sounds {
            match sound {
                Sound::IllegalInstruction
                | Sound::SegFault
                | Sound::BusError
                | Sound::Abort
                | Sound::UnhandledException
                | Sound::WatchdogTimeout => warn!("SimulatedPlatform: playing {sound:?}"),
                _ => debug!("SimulatedPlatform: playing {sound:?}"),
            }
        }
        hardware.sounds.extend(sounds);
        hardware.last_applied = Some(targets);
        hardware.applies += 1;
    }

    fn step(&self) {
        if let Some(step_ms) = self.step_ms {
            self.sim_time_ms.fetch_add(step_ms, Ordering::AcqRel);
            self.steps.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn has_stepping_authority(&self) -> bool {
        self.step_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepped_clock_only_moves_on_step() {
        let platform = SimulatedPlatform::stepped(1, 1, 40);
        assert!(platform.has_stepping_authority());
        assert_eq!(platform.time_ms(), 0.0);
        platform.step();
        platform.step();
        assert_eq!(platform.time_ms(), 80.0);
        assert_eq!(platform.step_count(), 2);
    }

    #[test]
    fn test_kill_relaxes_actuators() {
        let platform = SimulatedPlatform::new(1, 1);
        platform.kill();
        platform.kill();
        assert_eq!(platform.kill_count(), 2);
        let targets = platform.actuators().targets();
        assert!(!targets.stiffness_on);
        assert!(targets.frozen);
    }

    #[test]
    fn test_chest_press_and_sounds_reach_hardware() {
        let platform = SimulatedPlatform::new(1, 1);
        platform.press_chest_button();
        platform.update_sensors();
        assert_eq!(platform.sensors().chest_presses(), 1);

        platform.actuators().add_sound(Sound::SaveOn);
        platform.apply_actuators();
        assert_eq!(platform.played_sounds(), vec![Sound::SaveOn]);
        assert_eq!(platform.apply_count(), 1);
    }
}
