//! camera.rs
//! Synthetic frame source standing in for vision. Publishes a moving
//! gradient each cycle and honours SaveImages Jobs.

use std::{fs, path::PathBuf};

use log::{info, warn};

use crate::jobs::{JobKind, VisionJob};
use crate::modules::{SeeThinkContext, SeeThinkModule};
use crate::network::NuImage;

pub const FRAME_WIDTH: u16 = 80;
pub const FRAME_HEIGHT: u16 = 60;

pub struct SimulatedCamera {
    save_dir: Option<PathBuf>,
    saving: bool,
    stem: String,
    saved: u64,
    frames: u64,
}

impl SimulatedCamera {
    /// Frames are written under `save_dir` while saving is on; with `None`
    /// they are only counted.
    pub fn new(save_dir: Option<PathBuf>) -> Self {
        Self {
            save_dir,
            saving: false,
            stem: String::new(),
            saved: 0,
            frames: 0,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn saved_frames(&self) -> u64 {
        self.saved
    }

    fn grab(&self, now_ms: f64) -> NuImage {
        let offset = (self.frames % 256) as u8;
        let width = usize::from(FRAME_WIDTH);
        let pixels = (0..width * usize::from(FRAME_HEIGHT))
            .map(|i| ((i % width) as u8).wrapping_add(offset))
            .collect();
        NuImage {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            time_ms: now_ms,
            pixels,
        }
    }

    fn save(&mut self, frame: &NuImage) {
        self.saved += 1;
        let Some(dir) = &self.save_dir else {
            return;
        };
        let path = dir.join(format!("{}{:06}.nuim", self.stem, self.saved));
        if let Err(e) = fs::write(&path, frame.encode()) {
            warn!("SimulatedCamera: failed to save {}: {e}", path.display());
        }
    }
}

impl SeeThinkModule for SimulatedCamera {
    fn name(&self) -> &'static str {
        "camera"
    }

    fn process(&mut self, ctx: &mut SeeThinkContext<'_>) {
        for job in ctx.forwarded {
            if let JobKind::Vision(VisionJob::SaveImages {
                save,
                filename_stem,
                ..
            }) = job.kind()
            {
                if *save != self.saving {
                    info!("SimulatedCamera: saving images {}", if *save { "on" } else { "off" });
                }
                self.saving = *save;
                self.stem = filename_stem.clone();
            }
        }

        let frame = self.grab(ctx.now_ms);
        self.frames += 1;
        if self.saving {
            self.save(&frame);
        }
        ctx.publish_frame(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Job;

    #[test]
    fn test_save_images_job_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = SimulatedCamera::new(Some(dir.path().to_path_buf()));

        let on = [Job::save_images(0.0, true, true, "ball_")];
        let mut ctx = SeeThinkContext::new(10.0, &on);
        camera.process(&mut ctx);
        assert!(camera.is_saving());
        assert_eq!(ctx.frame().map(|f| f.pixels.len()), Some(80 * 60));

        let mut ctx = SeeThinkContext::new(20.0, &[]);
        camera.process(&mut ctx);

        let off = [Job::save_images(30.0, false, true, "ball_")];
        let mut ctx = SeeThinkContext::new(30.0, &off);
        camera.process(&mut ctx);

        assert_eq!(camera.saved_frames(), 2);
        assert!(dir.path().join("ball_000001.nuim").exists());
        assert!(dir.path().join("ball_000002.nuim").exists());
    }
}
