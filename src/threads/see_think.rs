//! see_think.rs
//! See-think loop body: run the vision and behaviour modules in order.
//!
//! Each cycle collects what sense-act forwarded since the last one, hands it
//! to every module, then publishes the emitted Jobs to the shared JobList
//! (and optionally the job port) and offers the latest frame to the image
//! stream.

use std::sync::Arc;

use crossbeam::channel::Receiver;
use log::{debug, warn};

use crate::error::TransportError;
use crate::jobs::{Job, JobList};
use crate::modules::{SeeThinkContext, SeeThinkModule};
use crate::network::NetworkIo;
use crate::platform::Platform;
use crate::threads::cycle_loop::LoopBody;

pub struct SeeThink {
    platform: Arc<dyn Platform>,
    modules: Vec<Box<dyn SeeThinkModule>>,
    forward_rx: Receiver<Job>,
    jobs: Arc<JobList>,
    io: Arc<NetworkIo>,
    mirror_jobs: bool,
    frames_sent: u64,
}

impl SeeThink {
    pub fn new(
        platform: Arc<dyn Platform>,
        modules: Vec<Box<dyn SeeThinkModule>>,
        forward_rx: Receiver<Job>,
        jobs: Arc<JobList>,
        io: Arc<NetworkIo>,
    ) -> Self {
        Self {
            platform,
            modules,
            forward_rx,
            jobs,
            io,
            mirror_jobs: false,
            frames_sent: 0,
        }
    }

    /// Also send emitted Jobs out of the job port.
    pub fn with_mirrored_jobs(mut self, mirror: bool) -> Self {
        self.mirror_jobs = mirror;
        self
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    fn mirror(&self, emitted: &[Job]) {
        match self.io.send_jobs(emitted) {
            Ok(_) | Err(TransportError::Disabled(_)) => {}
            Err(e) => warn!("see-think: failed to mirror Jobs: {e}"),
        }
    }
}

impl LoopBody for SeeThink {
    fn cycle(&mut self) {
        let forwarded: Vec<Job> = self.forward_rx.try_iter().collect();
        let mut ctx = SeeThinkContext::new(self.platform.time_ms(), &forwarded);
        for module in self.modules.iter_mut() {
            module.process(&mut ctx);
        }
        let (emitted, frame) = ctx.into_outputs();

        if !emitted.is_empty() {
            if self.mirror_jobs {
                self.mirror(&emitted);
            }
            self.jobs.extend(emitted);
        }

        if let Some(frame) = frame {
            match self.io.send_image(&frame) {
                Ok(true) => self.frames_sent += 1,
                Ok(false) | Err(TransportError::Disabled(_)) => {}
                Err(e) => debug!("see-think: image stream send failed: {e}"),
            }
        }
    }

    fn finish(&mut self) {
        let names: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        debug!("see-think: finished, modules {names:?}, {} frames streamed", self.frames_sent);
    }
}
