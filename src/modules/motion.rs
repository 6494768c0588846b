//! motion.rs
//! Minimal motion module: latches commanded walk velocity and slews the
//! head toward its target. No gait generation.

use std::sync::Arc;

use log::{debug, info};

use crate::blackboard::{ActuatorsData, Blackboard, SensorSnapshot, WalkCommand};
use crate::error::BlackboardError;
use crate::jobs::{Job, JobKind, MotionJob};
use crate::modules::MotionModule;

/// Largest head angle change per cycle, radians.
const HEAD_SLEW_PER_CYCLE: f32 = 0.05;
const HEAD_PITCH_JOINT: usize = 0;
const HEAD_YAW_JOINT: usize = 1;

pub struct BasicMotion {
    actuators: Arc<ActuatorsData>,
    walk: WalkCommand,
    head_target: (f32, f32),
    head: (f32, f32),
    killed: bool,
}

impl BasicMotion {
    pub fn new(blackboard: &Blackboard) -> Result<Self, BlackboardError> {
        Ok(Self::with_actuators(blackboard.actuators()?))
    }

    pub fn with_actuators(actuators: Arc<ActuatorsData>) -> Self {
        Self {
            actuators,
            walk: WalkCommand::default(),
            head_target: (0.0, 0.0),
            head: (0.0, 0.0),
            killed: false,
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn walk(&self) -> WalkCommand {
        self.walk
    }
}

impl MotionModule for BasicMotion {
    fn process_jobs(&mut self, jobs: &[Job]) {
        if self.killed {
            return;
        }
        for job in jobs {
            let JobKind::Motion(motion) = job.kind() else {
                continue;
            };
            match motion {
                MotionJob::Walk {
                    forward,
                    side,
                    turn,
                } => {
                    self.actuators.unfreeze();
                    self.walk = WalkCommand {
                        forward: *forward,
                        side: *side,
                        turn: *turn,
                    };
                }
                MotionJob::Head { pitch, yaw } => self.head_target = (*pitch, *yaw),
                MotionJob::Freeze => {
                    self.walk = WalkCommand::default();
                    self.actuators.freeze();
                    debug!("BasicMotion: frozen");
                }
            }
        }
    }

    fn process(&mut self, sensors: &SensorSnapshot) {
        if self.killed {
            return;
        }
        self.head.0 = slew(self.head.0, self.head_target.0);
        self.head.1 = slew(self.head.1, self.head_target.1);

        self.actuators.set_walk(self.walk);
        self.actuators.set_head(self.head.0, self.head.1);

        let mut joints = sensors.joint_positions;
        joints[HEAD_PITCH_JOINT] = self.head.0;
        joints[HEAD_YAW_JOINT] = self.head.1;
        self.actuators.set_joint_targets(joints);
    }

    fn kill(&mut self) {
        if !self.killed {
            info!("BasicMotion: killed");
        }
        self.killed = true;
        self.walk = WalkCommand::default();
        self.actuators.freeze();
    }
}

fn slew(current: f32, target: f32) -> f32 {
    current + (target - current).clamp(-HEAD_SLEW_PER_CYCLE, HEAD_SLEW_PER_CYCLE)
}
