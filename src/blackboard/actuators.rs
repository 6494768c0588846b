//! actuators.rs
//! Actuator targets and the queue of requested sounds.
//!
//! Written by the sense-act loop (through the motion module) and by the
//! emergency path. The platform reads it once per cycle in `apply_actuators`.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::blackboard::sensors::JOINT_COUNT;

/// Audible indicators. The fault variants map one-to-one onto fault causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sound {
    Startup,
    Shutdown,
    SaveOn,
    SaveOff,
    IllegalInstruction,
    SegFault,
    BusError,
    Abort,
    UnhandledException,
    WatchdogTimeout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WalkCommand {
    pub forward: f32,
    pub side: f32,
    pub turn: f32,
}

impl WalkCommand {
    pub fn is_stationary(&self) -> bool {
        self.forward == 0.0 && self.side == 0.0 && self.turn == 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorTargets {
    pub joint_targets: [f32; JOINT_COUNT],
    pub walk: WalkCommand,
    pub head_pitch: f32,
    pub head_yaw: f32,
    pub stiffness_on: bool,
    pub frozen: bool,
    /// Set by the platform kill. Latched, nothing clears it.
    pub killed: bool,
}

impl Default for ActuatorTargets {
    fn default() -> Self {
        Self {
            joint_targets: [0.0; JOINT_COUNT],
            walk: WalkCommand::default(),
            head_pitch: 0.0,
            head_yaw: 0.0,
            stiffness_on: true,
            frozen: false,
            killed: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ActuatorsData {
    targets: Mutex<ActuatorTargets>,
    sounds: Mutex<VecDeque<Sound>>,
}

impl ActuatorsData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> ActuatorTargets {
        self.targets.lock().clone()
    }

    /// Ignored while frozen.
    pub fn set_walk(&self, walk: WalkCommand) {
        let mut targets = self.targets.lock();
        if !targets.frozen {
            targets.walk = walk;
        }
    }

    /// Ignored while frozen.
    pub fn set_head(&self, pitch: f32, yaw: f32) {
        let mut targets = self.targets.lock();
        if !targets.frozen {
            targets.head_pitch = pitch;
            targets.head_yaw = yaw;
        }
    }

    pub fn set_joint_targets(&self, joints: [f32; JOINT_COUNT]) {
        let mut targets = self.targets.lock();
        if !targets.frozen {
            targets.joint_targets = joints;
        }
    }

    /// Stop all motion and hold posture until `unfreeze`.
    pub fn freeze(&self) {
        let mut targets = self.targets.lock();
        targets.walk = WalkCommand::default();
        targets.frozen = true;
    }

    /// No effect once killed.
    pub fn unfreeze(&self) {
        let mut targets = self.targets.lock();
        if !targets.killed {
            targets.frozen = false;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.targets.lock().frozen
    }

    /// Zero velocity and drop stiffness for good. Used by the platform kill.
    pub fn relax(&self) {
        let mut targets = self.targets.lock();
        targets.walk = WalkCommand::default();
        targets.stiffness_on = false;
        targets.frozen = true;
        targets.killed = true;
    }

    pub fn is_killed(&self) -> bool {
        self.targets.lock().killed
    }

    pub fn add_sound(&self, sound: Sound) {
        self.sounds.lock().push_back(sound);
    }

    /// Remove and return every pending sound, oldest first.
    pub fn take_sounds(&self) -> Vec<Sound> {
        self.sounds.lock().drain(..).collect()
    }

    pub fn pending_sounds(&self) -> usize {
        self.sounds.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_blocks_walk_until_unfrozen() {
        let actuators = ActuatorsData::new();
        actuators.set_walk(WalkCommand {
            forward: 5.0,
            side: 0.0,
            turn: 0.0,
        });
        actuators.freeze();
        assert!(actuators.targets().walk.is_stationary());

        actuators.set_walk(WalkCommand {
            forward: 3.0,
            ..Default::default()
        });
        assert!(actuators.targets().walk.is_stationary());

        actuators.unfreeze();
        actuators.set_walk(WalkCommand {
            forward: 3.0,
            ..Default::default()
        });
        assert_eq!(actuators.targets().walk.forward, 3.0);
    }

    #[test]
    fn test_relax_cannot_be_undone_by_unfreeze() {
        let actuators = ActuatorsData::new();
        actuators.relax();
        actuators.unfreeze();
        actuators.set_walk(WalkCommand {
            forward: 5.0,
            ..Default::default()
        });
        actuators.set_head(0.4, 0.4);

        let targets = actuators.targets();
        assert!(actuators.is_killed());
        assert!(targets.frozen);
        assert!(targets.walk.is_stationary());
        assert_eq!(targets.head_yaw, 0.0);
        assert!(!targets.stiffness_on);
    }

    #[test]
    fn test_sounds_drain_in_order() {
        let actuators = ActuatorsData::new();
        actuators.add_sound(Sound::SaveOn);
        actuators.add_sound(Sound::SegFault);
        assert_eq!(actuators.take_sounds(), vec![Sound::SaveOn, Sound::SegFault]);
        assert_eq!(actuators.pending_sounds(), 0);
    }
}
