//! job.rs
//! Typed command/data units exchanged between decision, actuation and vision modules.
//!
//! A `Job` is immutable once built. The kind hierarchy is a closed sum type so
//! every consumer (the sense-act router, the codec) matches it exhaustively.

use std::fmt;

/// Motion commands, consumed by the sense-act loop.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionJob {
    /// Target walk speed (forward cm/s, side cm/s, turn rad/s).
    Walk { forward: f32, side: f32, turn: f32 },
    /// Target head angles in radians.
    Head { pitch: f32, yaw: f32 },
    /// Hold the current posture with stiffness on.
    Freeze,
}

/// Vision commands, forwarded to the see-think loop.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionJob {
    SaveImages {
        save: bool,
        variable_settings: bool,
        filename_stem: String,
    },
}

/// Behaviour commands, forwarded to the see-think loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviourJob {
    SelectBehaviour { name: String },
    SetPlayer { number: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    Motion(MotionJob),
    Vision(VisionJob),
    Behaviour(BehaviourJob),
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Motion(MotionJob::Walk { .. }) => "WalkJob",
            JobKind::Motion(MotionJob::Head { .. }) => "HeadJob",
            JobKind::Motion(MotionJob::Freeze) => "MotionFreezeJob",
            JobKind::Vision(VisionJob::SaveImages { .. }) => "SaveImagesJob",
            JobKind::Behaviour(BehaviourJob::SelectBehaviour { .. }) => "SelectBehaviourJob",
            JobKind::Behaviour(BehaviourJob::SetPlayer { .. }) => "SetPlayerJob",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    created_ms: f64,
    kind: JobKind,
}

impl Job {
    pub fn new(created_ms: f64, kind: JobKind) -> Self {
        Self { created_ms, kind }
    }

    pub fn walk(created_ms: f64, forward: f32, side: f32, turn: f32) -> Self {
        Self::new(
            created_ms,
            JobKind::Motion(MotionJob::Walk {
                forward,
                side,
                turn,
            }),
        )
    }

    pub fn head(created_ms: f64, pitch: f32, yaw: f32) -> Self {
        Self::new(created_ms, JobKind::Motion(MotionJob::Head { pitch, yaw }))
    }

    pub fn freeze(created_ms: f64) -> Self {
        Self::new(created_ms, JobKind::Motion(MotionJob::Freeze))
    }

    pub fn save_images(created_ms: f64, save: bool, variable_settings: bool, stem: &str) -> Self {
        Self::new(
            created_ms,
            JobKind::Vision(VisionJob::SaveImages {
                save,
                variable_settings,
                filename_stem: stem.to_string(),
            }),
        )
    }

    pub fn select_behaviour(created_ms: f64, name: &str) -> Self {
        Self::new(
            created_ms,
            JobKind::Behaviour(BehaviourJob::SelectBehaviour {
                name: name.to_string(),
            }),
        )
    }

    /// Creation time in platform milliseconds.
    #[inline]
    pub fn created_ms(&self) -> f64 {
        self.created_ms
    }

    #[inline]
    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn into_kind(self) -> JobKind {
        self.kind
    }

    pub fn is_motion(&self) -> bool {
        matches!(self.kind, JobKind::Motion(_))
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.0}ms: ", self.kind.name(), self.created_ms)?;
        match &self.kind {
            JobKind::Motion(MotionJob::Walk {
                forward,
                side,
                turn,
            }) => write!(f, "speed=({forward:.2}, {side:.2}, {turn:.2})"),
            JobKind::Motion(MotionJob::Head { pitch, yaw }) => {
                write!(f, "pitch={pitch:.3} yaw={yaw:.3}")
            }
            JobKind::Motion(MotionJob::Freeze) => write!(f, "freeze"),
            JobKind::Vision(VisionJob::SaveImages {
                save,
                variable_settings,
                filename_stem,
            }) => write!(
                f,
                "save={save} variable={variable_settings} stem={filename_stem}"
            ),
            JobKind::Behaviour(BehaviourJob::SelectBehaviour { name }) => {
                write!(f, "behaviour={name}")
            }
            JobKind::Behaviour(BehaviourJob::SetPlayer { number }) => {
                write!(f, "player={number}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_kind() {
        let job = Job::walk(120.0, 5.0, 0.0, 0.1);
        let text = job.to_string();
        assert!(text.starts_with("WalkJob @ 120ms"), "{text}");
        assert!(job.is_motion());

        let job = Job::save_images(0.0, true, false, "field");
        assert!(job.to_string().contains("stem=field"));
        assert!(!job.is_motion());
    }
}
