//! emergency.rs
//! Put the robot in a safe state from whichever thread noticed the fault.
//!
//! Order: stop motion (or freeze the actuators if motion is busy), queue the
//! cause's sound, kill the platform, push the result to the hardware, then
//! wait out the grace period so the commands land.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{error, warn};

use crate::blackboard::{ActuatorsData, Sound};
use crate::platform::Platform;
use crate::threads::SharedMotion;

/// Longest wait for the motion lock before falling back to a raw freeze.
const MOTION_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCause {
    /// Fatal signal number.
    Signal(i32),
    LivenessTimeout {
        loop_name: &'static str,
        stalled_for: Duration,
    },
    Panic(String),
}

impl FaultCause {
    pub fn sound(&self) -> Sound {
        match self {
            FaultCause::Signal(libc::SIGILL) => Sound::IllegalInstruction,
            FaultCause::Signal(libc::SIGSEGV) => Sound::SegFault,
            FaultCause::Signal(libc::SIGBUS) => Sound::BusError,
            FaultCause::Signal(_) => Sound::Abort,
            FaultCause::LivenessTimeout { .. } => Sound::WatchdogTimeout,
            FaultCause::Panic(_) => Sound::UnhandledException,
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCause::Signal(libc::SIGILL) => write!(f, "SIGILL (illegal instruction)"),
            FaultCause::Signal(libc::SIGSEGV) => write!(f, "SIGSEGV (segmentation fault)"),
            FaultCause::Signal(libc::SIGBUS) => write!(f, "SIGBUS (bus error)"),
            FaultCause::Signal(libc::SIGABRT) => write!(f, "SIGABRT (abort)"),
            FaultCause::Signal(other) => write!(f, "signal {other}"),
            FaultCause::LivenessTimeout {
                loop_name,
                stalled_for,
            } => write!(
                f,
                "{loop_name} loop made no progress for {} ms",
                stalled_for.as_millis()
            ),
            FaultCause::Panic(message) => write!(f, "panic: {message}"),
        }
    }
}

pub struct Emergency {
    platform: Arc<dyn Platform>,
    actuators: Arc<ActuatorsData>,
    motion: Option<SharedMotion>,
    grace: Duration,
    engagements: AtomicU64,
}

impl Emergency {
    pub fn new(platform: Arc<dyn Platform>, motion: Option<SharedMotion>, grace: Duration) -> Self {
        Self {
            actuators: platform.actuators(),
            platform,
            motion,
            grace,
            engagements: AtomicU64::new(0),
        }
    }

    pub fn engagements(&self) -> u64 {
        self.engagements.load(Ordering::Relaxed)
    }

    /// Safe the robot. Blocks for the grace period.
    pub fn engage(&self, cause: &FaultCause) {
        self.engagements.fetch_add(1, Ordering::Relaxed);
        error!("EMERGENCY: {cause}");

        self.stop_motion();
        self.actuators.add_sound(cause.sound());
        self.platform.kill();
        self.platform.apply_actuators();

        let grace_ms = self.grace.as_millis() as u64;
        if grace_ms > 0 {
            self.platform.msleep(grace_ms);
        }
    }

    /// Queue the cause's sound without safing. Used for faults the runtime survives.
    pub fn announce(&self, cause: &FaultCause) {
        self.actuators.add_sound(cause.sound());
    }

    fn stop_motion(&self) {
        let Some(motion) = &self.motion else {
            self.actuators.freeze();
            return;
        };
        match motion.try_lock_for(MOTION_LOCK_TIMEOUT) {
            Some(mut motion) => motion.kill(),
            None => {
                warn!("emergency: motion busy, freezing actuators directly");
                self.actuators.freeze();
            }
        }
    }
}
