//! team_port.rs
//! Teammate broadcast: periodically send this robot's summary, fold
//! received summaries into `TeamInformation`.
//!
//! Packet layout, little-endian, 27 bytes:
//! `"NUtp"`, u8 player, u8 team, f64 sender time ms, f32 x, f32 y,
//! f32 heading, u8 lost.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, trace, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::blackboard::{FieldObjects, TeamInformation, TeamPacket};
use crate::error::{DecodeError, RuntimeError};
use crate::jobs::codec::ByteReader;
use crate::network::{
    Clock,
    udp_port::{PacketHandler, UdpPort, UdpPortOptions},
};

pub const TEAM_PACKET_HEADER: [u8; 4] = *b"NUtp";
pub const TEAM_PACKET_SIZE: usize = 27;

pub fn encode_team_packet(packet: &TeamPacket) -> Vec<u8> {
    let mut out = Vec::with_capacity(TEAM_PACKET_SIZE);
    out.extend_from_slice(&TEAM_PACKET_HEADER);
    out.push(packet.player_number);
    out.push(packet.team_number);
    out.extend_from_slice(&packet.sent_ms.to_le_bytes());
    out.extend_from_slice(&packet.x.to_le_bytes());
    out.extend_from_slice(&packet.y.to_le_bytes());
    out.extend_from_slice(&packet.heading.to_le_bytes());
    out.push(packet.lost as u8);
    out
}

pub fn decode_team_packet(bytes: &[u8]) -> Result<TeamPacket, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let header = reader.header()?;
    if header != TEAM_PACKET_HEADER {
        return Err(DecodeError::BadHeader(header));
    }
    let packet = TeamPacket {
        player_number: reader.u8()?,
        team_number: reader.u8()?,
        sent_ms: reader.f64()?,
        x: reader.f32()?,
        y: reader.f32()?,
        heading: reader.f32()?,
        lost: reader.bool()?,
    };
    reader.finish()?;
    Ok(packet)
}

pub struct TeamPortOptions {
    pub udp: UdpPortOptions,
    pub send_period: Duration,
    pub peer_timeout: Duration,
}

pub struct TeamPort {
    port: Arc<UdpPort>,
    running: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
    sender: Option<JoinHandle<()>>,
}

impl TeamPort {
    pub fn open(
        options: TeamPortOptions,
        team_info: Arc<TeamInformation>,
        field_objects: Arc<FieldObjects>,
        clock: Clock,
    ) -> Result<Self, RuntimeError> {
        let receive_info = Arc::clone(&team_info);
        let receive_clock = Arc::clone(&clock);
        let handler: PacketHandler = Box::new(move |bytes: &[u8], from: SocketAddr| {
            match decode_team_packet(bytes) {
                Ok(packet) => {
                    if receive_info.record_peer(packet, receive_clock()) {
                        trace!("TeamPort: player {} from {from}", packet.player_number);
                    }
                }
                Err(e) => warn!("TeamPort: dropped packet from {from}: {e}"),
            }
        });

        let port = Arc::new(UdpPort::open("team", options.udp, Some(handler))?);
        let running = Arc::new(AtomicBool::new(true));
        let sent = Arc::new(AtomicU64::new(0));

        let sender = {
            let port = Arc::clone(&port);
            let running = Arc::clone(&running);
            let sent = Arc::clone(&sent);
            let period = options.send_period;
            let peer_timeout_ms = options.peer_timeout.as_secs_f64() * 1e3;
            thread::Builder::new()
                .name("team-send".into())
                .spawn(move || {
                    let sleeper =
                        SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
                    let mut next_release = Instant::now();
                    while running.load(Ordering::Acquire) {
                        let now_ms = clock();
                        let packet = team_info.own_packet(&field_objects, now_ms);
                        match port.send_data(&encode_team_packet(&packet)) {
                            Ok(_) => {
                                sent.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => debug!("TeamPort: send failed: {e}"),
                        }
                        let pruned = team_info.prune_stale(now_ms, peer_timeout_ms);
                        if pruned > 0 {
                            debug!("TeamPort: forgot {pruned} silent teammates");
                        }

                        next_release += period;
                        let now = Instant::now();
                        if next_release > now {
                            sleeper.sleep(next_release - now);
                        } else {
                            next_release = now;
                        }
                    }
                })
                .map_err(|source| RuntimeError::Spawn {
                    name: "team-send",
                    source,
                })?
        };

        Ok(Self {
            port,
            running,
            sent,
            sender: Some(sender),
        })
    }

    pub fn udp(&self) -> &UdpPort {
        &self.port
    }

    pub fn packets_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.port.is_stale(threshold)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.sender.take() {
            if handle.join().is_err() {
                error!("TeamPort: send thread panicked");
            }
        }
    }
}

impl Drop for TeamPort {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Broadcast target for a team port on `port`.
pub fn team_broadcast(bind_address: Ipv4Addr, broadcast: Ipv4Addr, port: u16) -> UdpPortOptions {
    UdpPortOptions {
        bind_address,
        port,
        target: SocketAddrV4::new(broadcast, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_packet_layout() {
        let packet = TeamPacket {
            player_number: 4,
            team_number: 12,
            sent_ms: 1234.5,
            x: -100.0,
            y: 50.0,
            heading: 1.5,
            lost: true,
        };
        let bytes = encode_team_packet(&packet);
        assert_eq!(bytes.len(), TEAM_PACKET_SIZE);
        assert_eq!(&bytes[..4], b"NUtp");
        assert_eq!(decode_team_packet(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_team_packet_rejects_other_headers() {
        let mut bytes = encode_team_packet(&TeamPacket {
            player_number: 1,
            team_number: 1,
            sent_ms: 0.0,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            lost: false,
        });
        bytes[3] = b'x';
        assert!(matches!(
            decode_team_packet(&bytes),
            Err(DecodeError::BadHeader(_))
        ));
    }
}
