//! modules
//! Interfaces between the loops and the modules they drive, plus the
//! stand-in modules shipped with the runtime.
//!
//! A `MotionModule` runs on the sense-act loop and receives motion Jobs in
//! the cycle they are drained. `SeeThinkModule`s run in order on the
//! see-think loop and receive the vision and behaviour Jobs forwarded to it.

pub mod behaviour;
pub mod camera;
pub mod motion;

use crate::blackboard::{Blackboard, SensorSnapshot};
use crate::error::BlackboardError;
use crate::jobs::Job;
use crate::network::NuImage;

pub use behaviour::ScriptedBehaviour;
pub use camera::SimulatedCamera;
pub use motion::BasicMotion;

pub trait MotionModule: Send {
    /// Motion Jobs drained this cycle, in order.
    fn process_jobs(&mut self, jobs: &[Job]);

    /// One control step against the latest sensor snapshot.
    fn process(&mut self, sensors: &SensorSnapshot);

    /// Stop every motion now and ignore further commands.
    fn kill(&mut self);
}

pub trait SeeThinkModule: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, ctx: &mut SeeThinkContext<'_>);
}

/// Per-cycle input and output of the see-think modules.
pub struct SeeThinkContext<'a> {
    pub now_ms: f64,
    /// Vision and behaviour Jobs forwarded by sense-act since the last cycle.
    pub forwarded: &'a [Job],
    emitted: Vec<Job>,
    frame: Option<NuImage>,
}

impl<'a> SeeThinkContext<'a> {
    pub fn new(now_ms: f64, forwarded: &'a [Job]) -> Self {
        Self {
            now_ms,
            forwarded,
            emitted: Vec::new(),
            frame: None,
        }
    }

    /// Queue a Job for the shared JobList.
    pub fn emit(&mut self, job: Job) {
        self.emitted.push(job);
    }

    /// Offer a frame to the debug image stream. Later modules replace earlier ones.
    pub fn publish_frame(&mut self, frame: NuImage) {
        self.frame = Some(frame);
    }

    pub fn frame(&self) -> Option<&NuImage> {
        self.frame.as_ref()
    }

    pub fn emitted(&self) -> &[Job] {
        &self.emitted
    }

    pub fn into_outputs(self) -> (Vec<Job>, Option<NuImage>) {
        (self.emitted, self.frame)
    }
}

/// Everything the orchestrator drives. Construction failures are fatal.
#[derive(Default)]
pub struct Modules {
    pub motion: Option<Box<dyn MotionModule>>,
    pub see_think: Vec<Box<dyn SeeThinkModule>>,
}

impl Modules {
    /// Stand-in motion, camera and scripted behaviour.
    pub fn standard(blackboard: &Blackboard) -> Result<Self, BlackboardError> {
        Ok(Self {
            motion: Some(Box::new(BasicMotion::new(blackboard)?)),
            see_think: vec![
                Box::new(SimulatedCamera::new(None)),
                Box::new(ScriptedBehaviour::new(blackboard)?),
            ],
        })
    }

    pub fn see_think_names(&self) -> Vec<&'static str> {
        self.see_think.iter().map(|m| m.name()).collect()
    }
}
