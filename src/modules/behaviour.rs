//! behaviour.rs
//! Scripted behaviour: a chest click saves images for one cycle, entering
//! Playing starts a slow walk with a head scan, leaving Playing freezes.

use std::sync::Arc;

use log::{debug, info};

use crate::blackboard::{ActuatorsData, Blackboard, GameInformation, GameState, SensorsData, Sound};
use crate::error::BlackboardError;
use crate::jobs::{BehaviourJob, Job, JobKind};
use crate::modules::{SeeThinkContext, SeeThinkModule};

const SCAN_YAWS: [f32; 4] = [-0.8, 0.0, 0.8, 0.0];
const SCAN_PITCH: f32 = 0.2;
/// Cycles between head scan steps.
const SCAN_INTERVAL: u64 = 15;
const WALK_FORWARD: f32 = 2.0;
const IMAGE_STEM: &str = "image";

pub struct ScriptedBehaviour {
    sensors: Arc<SensorsData>,
    actuators: Arc<ActuatorsData>,
    game_info: Arc<GameInformation>,
    last_presses: Option<u32>,
    saving_images: bool,
    playing: bool,
    cycles: u64,
    scan_index: usize,
    selected: String,
    player_override: Option<u8>,
}

impl ScriptedBehaviour {
    pub fn new(blackboard: &Blackboard) -> Result<Self, BlackboardError> {
        Ok(Self {
            sensors: blackboard.sensors()?,
            actuators: blackboard.actuators()?,
            game_info: blackboard.game_info()?,
            last_presses: None,
            saving_images: false,
            playing: false,
            cycles: 0,
            scan_index: 0,
            selected: "scripted".to_string(),
            player_override: None,
        })
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn player_override(&self) -> Option<u8> {
        self.player_override
    }

    fn handle_forwarded(&mut self, jobs: &[Job]) {
        for job in jobs {
            match job.kind() {
                JobKind::Behaviour(BehaviourJob::SelectBehaviour { name }) => {
                    info!("ScriptedBehaviour: selected {name}");
                    self.selected = name.clone();
                }
                JobKind::Behaviour(BehaviourJob::SetPlayer { number }) => {
                    info!("ScriptedBehaviour: playing as {number}");
                    self.player_override = Some(*number);
                }
                _ => {}
            }
        }
    }

    /// New chest clicks since the previous cycle.
    fn chest_clicked(&mut self) -> bool {
        let presses = self.sensors.chest_presses();
        let clicked = self.last_presses.is_some_and(|last| presses > last);
        self.last_presses = Some(presses);
        clicked
    }

    fn save_images(&mut self, ctx: &mut SeeThinkContext<'_>) {
        if self.chest_clicked() {
            self.saving_images = true;
            self.actuators.add_sound(Sound::SaveOn);
            ctx.emit(Job::save_images(ctx.now_ms, true, true, IMAGE_STEM));
        } else if self.saving_images {
            self.saving_images = false;
            self.actuators.add_sound(Sound::SaveOff);
            ctx.emit(Job::save_images(ctx.now_ms, false, true, IMAGE_STEM));
        }
    }

    fn selected_motion(&mut self, ctx: &mut SeeThinkContext<'_>) {
        let playing = self.game_info.state() == GameState::Playing && !self.game_info.is_penalised();
        if playing && !self.playing {
            debug!("ScriptedBehaviour: start walking");
            ctx.emit(Job::walk(ctx.now_ms, WALK_FORWARD, 0.0, 0.0));
            self.scan_index = 0;
        } else if !playing && self.playing {
            debug!("ScriptedBehaviour: freeze");
            ctx.emit(Job::freeze(ctx.now_ms));
        }
        self.playing = playing;

        if playing && self.cycles % SCAN_INTERVAL == 0 {
            let yaw = SCAN_YAWS[self.scan_index % SCAN_YAWS.len()];
            self.scan_index += 1;
            ctx.emit(Job::head(ctx.now_ms, SCAN_PITCH, yaw));
        }
    }
}

impl SeeThinkModule for ScriptedBehaviour {
    fn name(&self) -> &'static str {
        "behaviour"
    }

    fn process(&mut self, ctx: &mut SeeThinkContext<'_>) {
        self.handle_forwarded(ctx.forwarded);
        self.save_images(ctx);
        self.selected_motion(ctx);
        self.cycles += 1;
    }
}
