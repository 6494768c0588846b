//! team_info.rs
//! This robot's team summary and the last packet heard from each teammate.

use dashmap::DashMap;

use crate::blackboard::field_objects::FieldObjects;

/// Summarized state exchanged between teammates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamPacket {
    pub player_number: u8,
    pub team_number: u8,
    pub sent_ms: f64,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub lost: bool,
}

#[derive(Debug, Clone, Copy)]
struct PeerRecord {
    packet: TeamPacket,
    received_ms: f64,
}

#[derive(Debug)]
pub struct TeamInformation {
    robot_number: u8,
    team_number: u8,
    peers: DashMap<u8, PeerRecord>,
}

impl TeamInformation {
    pub fn new(robot_number: u8, team_number: u8) -> Self {
        Self {
            robot_number,
            team_number,
            peers: DashMap::new(),
        }
    }

    pub fn robot_number(&self) -> u8 {
        self.robot_number
    }

    pub fn team_number(&self) -> u8 {
        self.team_number
    }

    /// Packet describing this robot right now.
    pub fn own_packet(&self, field_objects: &FieldObjects, now_ms: f64) -> TeamPacket {
        let location = field_objects.self_location();
        TeamPacket {
            player_number: self.robot_number,
            team_number: self.team_number,
            sent_ms: now_ms,
            x: location.x,
            y: location.y,
            heading: location.heading,
            lost: location.lost,
        }
    }

    /// Store a teammate's packet. Our own echoes and other teams are ignored.
    pub fn record_peer(&self, packet: TeamPacket, received_ms: f64) -> bool {
        if packet.team_number != self.team_number || packet.player_number == self.robot_number {
            return false;
        }
        self.peers.insert(
            packet.player_number,
            PeerRecord {
                packet,
                received_ms,
            },
        );
        true
    }

    /// Latest packet from `player` and when it arrived.
    pub fn peer(&self, player: u8) -> Option<(TeamPacket, f64)> {
        self.peers
            .get(&player)
            .map(|record| (record.packet, record.received_ms))
    }

    /// All known teammates ordered by player number.
    pub fn peers(&self) -> Vec<TeamPacket> {
        let mut packets: Vec<TeamPacket> = self.peers.iter().map(|r| r.packet).collect();
        packets.sort_by_key(|p| p.player_number);
        packets
    }

    /// Forget teammates not heard from within `max_age_ms`.
    pub fn prune_stale(&self, now_ms: f64, max_age_ms: f64) -> usize {
        let before = self.peers.len();
        self.peers
            .retain(|_, record| now_ms - record.received_ms <= max_age_ms);
        before - self.peers.len()
    }
}
