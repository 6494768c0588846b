//! game_info.rs
//! Robot/team identity and the latest decoded game-controller state.

use parking_lot::RwLock;

use crate::network::game_controller::GameControlData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GameState {
    #[default]
    Initial,
    Ready,
    Set,
    Playing,
    Finished,
}

impl GameState {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(GameState::Initial),
            1 => Some(GameState::Ready),
            2 => Some(GameState::Set),
            3 => Some(GameState::Playing),
            4 => Some(GameState::Finished),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GameState::Initial => "Initial",
            GameState::Ready => "Ready",
            GameState::Set => "Set",
            GameState::Playing => "Playing",
            GameState::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameSnapshot {
    pub state: GameState,
    pub first_half: bool,
    pub our_kickoff: bool,
    pub penalised: bool,
    pub our_score: u8,
    pub their_score: u8,
    pub secs_remaining: u32,
    pub packets_received: u64,
    pub last_packet_ms: Option<f64>,
}

#[derive(Debug)]
pub struct GameInformation {
    robot_number: u8,
    team_number: u8,
    snapshot: RwLock<GameSnapshot>,
}

impl GameInformation {
    pub fn new(robot_number: u8, team_number: u8) -> Self {
        Self {
            robot_number,
            team_number,
            snapshot: RwLock::new(GameSnapshot::default()),
        }
    }

    pub fn robot_number(&self) -> u8 {
        self.robot_number
    }

    pub fn team_number(&self) -> u8 {
        self.team_number
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> GameState {
        self.snapshot.read().state
    }

    pub fn is_penalised(&self) -> bool {
        self.snapshot.read().penalised
    }

    /// Fold a decoded game-controller packet into the shared state.
    ///
    /// Returns `false` (and changes nothing) when the packet does not name
    /// this robot's team.
    pub fn apply(&self, data: &GameControlData, now_ms: f64) -> bool {
        let Some(ours) = data.teams.iter().position(|t| t.team_number == self.team_number) else {
            return false;
        };
        let theirs = 1 - ours;
        let our_team = &data.teams[ours];

        let slot = usize::from(self.robot_number.saturating_sub(1));
        let penalised = slot < usize::from(data.players_per_team)
            && our_team
                .players
                .get(slot)
                .is_some_and(|player| player.penalty != 0);

        let mut snapshot = self.snapshot.write();
        snapshot.state = data.state;
        snapshot.first_half = data.first_half;
        snapshot.our_kickoff = data.kick_off_team == our_team.team_colour;
        snapshot.penalised = penalised;
        snapshot.our_score = our_team.score;
        snapshot.their_score = data.teams[theirs].score;
        snapshot.secs_remaining = data.secs_remaining;
        snapshot.packets_received += 1;
        snapshot.last_packet_ms = Some(now_ms);
        true
    }

    /// Manual state change, e.g. from the chest button when no controller is present.
    pub fn set_state(&self, state: GameState) {
        self.snapshot.write().state = state;
    }
}
