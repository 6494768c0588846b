//! game_controller.rs
//! Read-only listener for the RoboCup SPL game controller (struct version 7).
//!
//! Packet layout, little-endian, 116 bytes:
//! ```text
//! [4]  header "RGme"
//! u32  version (7)
//! u8   players per team
//! u8   state (0 initial .. 4 finished)
//! u8   first half
//! u8   kick-off team colour
//! u8   secondary state
//! u8   drop-in team colour
//! u16  drop-in time
//! u32  seconds remaining
//! 2 x team:
//!     u8 team number, u8 team colour, u8 goal colour, u8 score
//!     11 x (u16 penalty, u16 seconds until unpenalised)
//! ```

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, warn};

use crate::blackboard::{GameInformation, GameState};
use crate::error::{DecodeError, TransportError};
use crate::jobs::codec::ByteReader;
use crate::network::{
    Clock,
    udp_port::{PacketHandler, UdpPort, UdpPortOptions},
};
use crate::utils::cycle_log::{CycleEventKind, CycleLog};

pub const GAMECONTROLLER_HEADER: [u8; 4] = *b"RGme";
pub const GAMECONTROLLER_STRUCT_VERSION: u32 = 7;
pub const MAX_NUM_PLAYERS: usize = 11;
pub const PACKET_SIZE: usize = 20 + 2 * (4 + MAX_NUM_PLAYERS * 4);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RobotInfo {
    /// Zero when not penalised.
    pub penalty: u16,
    pub secs_till_unpenalised: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamInfo {
    pub team_number: u8,
    pub team_colour: u8,
    pub goal_colour: u8,
    pub score: u8,
    pub players: [RobotInfo; MAX_NUM_PLAYERS],
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameControlData {
    pub players_per_team: u8,
    pub state: GameState,
    pub first_half: bool,
    pub kick_off_team: u8,
    pub secondary_state: u8,
    pub drop_in_team: u8,
    pub drop_in_time: u16,
    pub secs_remaining: u32,
    pub teams: [TeamInfo; 2],
}

impl GameControlData {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let header = reader.header()?;
        if header != GAMECONTROLLER_HEADER {
            return Err(DecodeError::BadHeader(header));
        }
        let version = reader.u32()?;
        if version != GAMECONTROLLER_STRUCT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let players_per_team = reader.u8()?;
        if usize::from(players_per_team) > MAX_NUM_PLAYERS {
            return Err(DecodeError::OutOfRange {
                field: "players_per_team",
                value: players_per_team.into(),
            });
        }
        let raw_state = reader.u8()?;
        let state = GameState::from_wire(raw_state).ok_or(DecodeError::OutOfRange {
            field: "state",
            value: raw_state.into(),
        })?;

        let data = Self {
            players_per_team,
            state,
            first_half: reader.bool()?,
            kick_off_team: reader.u8()?,
            secondary_state: reader.u8()?,
            drop_in_team: reader.u8()?,
            drop_in_time: reader.u16()?,
            secs_remaining: reader.u32()?,
            teams: [decode_team(&mut reader)?, decode_team(&mut reader)?],
        };
        reader.finish()?;
        Ok(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKET_SIZE);
        out.extend_from_slice(&GAMECONTROLLER_HEADER);
        out.extend_from_slice(&GAMECONTROLLER_STRUCT_VERSION.to_le_bytes());
        out.push(self.players_per_team);
        out.push(self.state as u8);
        out.push(self.first_half as u8);
        out.push(self.kick_off_team);
        out.push(self.secondary_state);
        out.push(self.drop_in_team);
        out.extend_from_slice(&self.drop_in_time.to_le_bytes());
        out.extend_from_slice(&self.secs_remaining.to_le_bytes());
        for team in &self.teams {
            out.extend_from_slice(&[
                team.team_number,
                team.team_colour,
                team.goal_colour,
                team.score,
            ]);
            for player in &team.players {
                out.extend_from_slice(&player.penalty.to_le_bytes());
                out.extend_from_slice(&player.secs_till_unpenalised.to_le_bytes());
            }
        }
        out
    }
}

impl Default for GameControlData {
    fn default() -> Self {
        Self {
            players_per_team: 4,
            state: GameState::Initial,
            first_half: true,
            kick_off_team: 0,
            secondary_state: 0,
            drop_in_team: 0,
            drop_in_time: 0,
            secs_remaining: 600,
            teams: [
                TeamInfo {
                    team_colour: 0,
                    goal_colour: 0,
                    ..TeamInfo::default()
                },
                TeamInfo {
                    team_colour: 1,
                    goal_colour: 1,
                    ..TeamInfo::default()
                },
            ],
        }
    }
}

fn decode_team(reader: &mut ByteReader<'_>) -> Result<TeamInfo, DecodeError> {
    let mut team = TeamInfo {
        team_number: reader.u8()?,
        team_colour: reader.u8()?,
        goal_colour: reader.u8()?,
        score: reader.u8()?,
        players: [RobotInfo::default(); MAX_NUM_PLAYERS],
    };
    for player in team.players.iter_mut() {
        player.penalty = reader.u16()?;
        player.secs_till_unpenalised = reader.u16()?;
    }
    Ok(team)
}

/// Decodes every controller packet straight into `GameInformation`.
pub struct GameControllerPort {
    port: UdpPort,
    decode_errors: Arc<AtomicU64>,
}

impl GameControllerPort {
    pub fn open(
        bind_address: Ipv4Addr,
        port: u16,
        game_info: Arc<GameInformation>,
        clock: Clock,
    ) -> Result<Self, TransportError> {
        Self::open_logged(bind_address, port, game_info, clock, None)
    }

    /// As `open`, also recording rejected packets in `cycle_log`.
    pub fn open_logged(
        bind_address: Ipv4Addr,
        port: u16,
        game_info: Arc<GameInformation>,
        clock: Clock,
        cycle_log: Option<CycleLog>,
    ) -> Result<Self, TransportError> {
        let decode_errors = Arc::new(AtomicU64::new(0));
        let errors = Arc::clone(&decode_errors);
        let handler: PacketHandler = Box::new(move |bytes: &[u8], from: SocketAddr| {
            match GameControlData::decode(bytes) {
                Ok(data) => {
                    if game_info.apply(&data, clock()) {
                        debug!("GameController: {} from {from}", data.state.name());
                    }
                }
                Err(e) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!("GameController: dropped packet from {from}: {e}");
                    if let Some(log) = &cycle_log {
                        let size = bytes.len() as f64;
                        log.record("game-controller", CycleEventKind::DecodeDrop, size);
                    }
                }
            }
        });

        let options = UdpPortOptions {
            bind_address,
            port,
            target: SocketAddrV4::new(Ipv4Addr::BROADCAST, port),
        };
        Ok(Self {
            port: UdpPort::open("game-controller", options, Some(handler))?,
            decode_errors,
        })
    }

    pub fn udp(&self) -> &UdpPort {
        &self.port
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.port.is_stale(threshold)
    }
}
