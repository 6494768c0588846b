//! sense_act.rs
//! Sense-act loop body: read sensors, drain Jobs, run motion, write actuators.
//!
//! Motion Jobs go to the motion module in the same cycle they are drained.
//! Vision and behaviour Jobs are forwarded to see-think over a bounded
//! channel; a full channel drops the Job with a warning rather than stall
//! the control cycle.

use std::sync::Arc;

use crossbeam::channel::{Sender, TrySendError};
use log::warn;
use parking_lot::Mutex;

use crate::blackboard::SensorsData;
use crate::jobs::{Job, JobKind, JobList};
use crate::modules::MotionModule;
use crate::platform::Platform;
use crate::threads::cycle_loop::LoopBody;

/// Jobs waiting for see-think before sense-act starts dropping them.
pub const FORWARD_CAPACITY: usize = 64;

/// Motion is shared with the emergency path, which kills it from other threads.
pub type SharedMotion = Arc<Mutex<Box<dyn MotionModule>>>;

pub struct SenseAct {
    platform: Arc<dyn Platform>,
    sensors: Arc<SensorsData>,
    jobs: Arc<JobList>,
    motion: Option<SharedMotion>,
    forward_tx: Sender<Job>,
    motion_jobs: Vec<Job>,
    dropped_forwards: u64,
}

impl SenseAct {
    pub fn new(
        platform: Arc<dyn Platform>,
        jobs: Arc<JobList>,
        motion: Option<SharedMotion>,
        forward_tx: Sender<Job>,
    ) -> Self {
        Self {
            sensors: platform.sensors(),
            platform,
            jobs,
            motion,
            forward_tx,
            motion_jobs: Vec::new(),
            dropped_forwards: 0,
        }
    }

    pub fn dropped_forwards(&self) -> u64 {
        self.dropped_forwards
    }

    fn route(&mut self, job: Job) {
        match job.kind() {
            JobKind::Motion(_) => self.motion_jobs.push(job),
            JobKind::Vision(_) | JobKind::Behaviour(_) => match self.forward_tx.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    self.dropped_forwards += 1;
                    warn!("sense-act: see-think backlog full, dropped {job}");
                }
                // See-think is gone; nothing left to deliver to.
                Err(TrySendError::Disconnected(_)) => {}
            },
        }
    }
}

impl LoopBody for SenseAct {
    fn cycle(&mut self) {
        self.platform.update_sensors();
        let snapshot = self.sensors.snapshot();

        for job in self.jobs.drain() {
            self.route(job);
        }

        if let Some(motion) = &self.motion {
            let mut motion = motion.lock();
            motion.process_jobs(&self.motion_jobs);
            motion.process(&snapshot);
        }
        self.motion_jobs.clear();

        self.platform.apply_actuators();
    }

    fn finish(&mut self) {
        if self.dropped_forwards > 0 {
            warn!(
                "sense-act: {} Jobs dropped on the way to see-think",
                self.dropped_forwards
            );
        }
    }
}
