//! network
//! Network façade owning the optional ports and routing Jobs, team state,
//! game-controller packets and debug images through them.
//!
//! A port whose socket cannot be opened is logged and left out; the robot
//! keeps running without that feature.

pub mod game_controller;
pub mod image_stream;
pub mod job_port;
pub mod tcp_port;
pub mod team_port;
pub mod udp_port;

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
    time::Duration,
};

use log::{error, info, warn};

use crate::blackboard::Blackboard;
use crate::config::NetworkConfig;
use crate::error::{BlackboardError, TransportError};
use crate::jobs::{Job, JobList};
use crate::utils::cycle_log::CycleLog;

pub use game_controller::{GameControlData, GameControllerPort};
pub use image_stream::{ImageStreamPort, NuImage};
pub use job_port::JobPort;
pub use tcp_port::TcpPort;
pub use team_port::{TeamPort, TeamPortOptions};
pub use udp_port::{NetworkData, PacketHandler, UdpPort, UdpPortOptions};

pub const GAME_CONTROLLER_PORT: u16 = 3838;
pub const TEAM_PORT: u16 = 10001;
pub const JOB_PORT: u16 = 10002;
pub const IMAGE_STREAM_PORT: u16 = 10003;

/// Platform time source handed to receive threads.
pub type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Default)]
pub struct NetworkIo {
    game_controller: Option<GameControllerPort>,
    team: Option<TeamPort>,
    jobs: Option<JobPort>,
    image_stream: Option<ImageStreamPort>,
}

impl NetworkIo {
    /// No ports at all.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Open every port enabled in `config`. Only Blackboard lookups are fatal.
    /// Rejected payloads are recorded in `cycle_log` when one is given.
    pub fn new(
        config: &NetworkConfig,
        blackboard: &Blackboard,
        clock: Clock,
        cycle_log: Option<CycleLog>,
    ) -> Result<Self, BlackboardError> {
        let bind = config.bind_address;
        let mut io = Self::default();

        if let Some(port) = config.game_controller.active() {
            io.game_controller = degrade(
                "game-controller",
                GameControllerPort::open_logged(
                    bind,
                    port,
                    blackboard.game_info()?,
                    Arc::clone(&clock),
                    cycle_log.clone(),
                ),
            );
        }

        if let Some(port) = config.team.active() {
            let options = TeamPortOptions {
                udp: team_port::team_broadcast(bind, config.broadcast_address, port),
                send_period: Duration::from_millis(config.team_send_period_ms),
                peer_timeout: Duration::from_millis(config.team_peer_timeout_ms),
            };
            io.team = degrade(
                "team",
                TeamPort::open(
                    options,
                    blackboard.team_info()?,
                    blackboard.field_objects()?,
                    Arc::clone(&clock),
                ),
            );
        }

        if let Some(port) = config.jobs.active() {
            let options = UdpPortOptions {
                bind_address: bind,
                port,
                target: SocketAddrV4::new(config.broadcast_address, port),
            };
            io.jobs = degrade(
                "jobs",
                JobPort::open_logged(options, blackboard.jobs()?, cycle_log),
            );
        }

        if let Some(port) = config.image_stream.active() {
            io.image_stream = degrade("image-stream", ImageStreamPort::open(bind, port));
        }

        info!("NetworkIo: active ports {:?}", io.active_ports());
        Ok(io)
    }

    pub fn active_ports(&self) -> Vec<&'static str> {
        let mut ports = Vec::with_capacity(4);
        if self.game_controller.is_some() {
            ports.push("game-controller");
        }
        if self.team.is_some() {
            ports.push("team");
        }
        if self.jobs.is_some() {
            ports.push("jobs");
        }
        if self.image_stream.is_some() {
            ports.push("image-stream");
        }
        ports
    }

    /// Names of the UDP ports that heard nothing within `threshold`.
    pub fn stale_ports(&self, threshold: Duration) -> Vec<&'static str> {
        let mut stale = Vec::new();
        if self
            .game_controller
            .as_ref()
            .is_some_and(|p| p.is_stale(threshold))
        {
            stale.push("game-controller");
        }
        if self.team.as_ref().is_some_and(|p| p.is_stale(threshold)) {
            stale.push("team");
        }
        if self.jobs.as_ref().is_some_and(|p| p.is_stale(threshold)) {
            stale.push("jobs");
        }
        stale
    }

    pub fn send_jobs(&self, jobs: &[Job]) -> Result<usize, TransportError> {
        self.job_port()?.send(jobs)
    }

    pub fn send_job_list(&self, list: &JobList) -> Result<usize, TransportError> {
        self.job_port()?.send_list(list)
    }

    /// Unicast outgoing Jobs to `address` (dotted IPv4).
    pub fn set_job_port_target_address(&self, address: &str) -> Result<(), TransportError> {
        let port = self.job_port().inspect_err(|_| {
            error!("NetworkIo: cannot set job target, network jobs are off");
        })?;
        let ip: Ipv4Addr = address
            .trim()
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;
        port.set_target_address(ip);
        Ok(())
    }

    pub fn set_job_port_to_broadcast(&self) -> Result<(), TransportError> {
        let port = self.job_port().inspect_err(|_| {
            error!("NetworkIo: cannot broadcast jobs, network jobs are off");
        })?;
        port.set_broadcast();
        Ok(())
    }

    /// Stream `image` if a viewer requested one. Returns whether it was sent.
    pub fn send_image(&self, image: &NuImage) -> Result<bool, TransportError> {
        self.image_stream
            .as_ref()
            .ok_or(TransportError::Disabled("image-stream"))?
            .offer(image)
    }

    pub fn game_controller(&self) -> Option<&GameControllerPort> {
        self.game_controller.as_ref()
    }

    pub fn team(&self) -> Option<&TeamPort> {
        self.team.as_ref()
    }

    pub fn jobs(&self) -> Option<&JobPort> {
        self.jobs.as_ref()
    }

    pub fn image_stream(&self) -> Option<&ImageStreamPort> {
        self.image_stream.as_ref()
    }

    fn job_port(&self) -> Result<&JobPort, TransportError> {
        self.jobs.as_ref().ok_or(TransportError::Disabled("jobs"))
    }

    /// Close every port, newest first.
    pub fn shutdown(&mut self) {
        drop(self.image_stream.take());
        drop(self.jobs.take());
        drop(self.team.take());
        drop(self.game_controller.take());
    }
}

impl Drop for NetworkIo {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn degrade<P, E: std::fmt::Display>(name: &str, opened: Result<P, E>) -> Option<P> {
    match opened {
        Ok(port) => Some(port),
        Err(e) => {
            warn!("NetworkIo: {name} port unavailable, continuing without it: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortConfig;
    use std::{thread, time::Instant};

    fn jobs_only_io(jobs: Arc<JobList>) -> NetworkIo {
        let board = Blackboard::new();
        board.add(jobs).unwrap();
        let config = NetworkConfig {
            bind_address: Ipv4Addr::LOCALHOST,
            jobs: PortConfig::enabled(0),
            ..NetworkConfig::offline()
        };
        NetworkIo::new(&config, &board, Arc::new(|| 0.0_f64), None).unwrap()
    }

    #[test]
    fn test_offline_reports_disabled() {
        let io = NetworkIo::offline();
        assert!(io.active_ports().is_empty());
        assert!(matches!(
            io.send_jobs(&[Job::freeze(0.0)]),
            Err(TransportError::Disabled("jobs"))
        ));
        assert!(matches!(
            io.set_job_port_target_address("10.0.0.2"),
            Err(TransportError::Disabled("jobs"))
        ));
        assert!(io.set_job_port_to_broadcast().is_err());
    }

    #[test]
    fn test_send_job_list_keeps_list_and_reaches_peer() {
        let peer_jobs = Arc::new(JobList::new());
        let peer = jobs_only_io(Arc::clone(&peer_jobs));
        let peer_port = peer.jobs().unwrap().udp().port();

        let io = jobs_only_io(Arc::new(JobList::new()));
        io.jobs()
            .unwrap()
            .set_target(SocketAddrV4::new(Ipv4Addr::LOCALHOST, peer_port));

        let outgoing = JobList::new();
        outgoing.add(Job::freeze(1.0));
        outgoing.add(Job::head(2.0, 0.1, 0.2));
        assert!(io.send_job_list(&outgoing).unwrap() > 0);
        assert_eq!(outgoing.len(), 2);
        assert_eq!(io.send_job_list(&JobList::new()).unwrap(), 0);

        let deadline = Instant::now() + Duration::from_secs(2);
        while peer_jobs.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(peer_jobs.drain(), outgoing.drain());
    }

    #[test]
    fn test_stale_ports_lists_silent_ports() {
        let io = jobs_only_io(Arc::new(JobList::new()));
        assert!(io.stale_ports(Duration::from_secs(3600)).is_empty());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(io.stale_ports(Duration::from_millis(5)), vec!["jobs"]);
        assert!(NetworkIo::offline().stale_ports(Duration::ZERO).is_empty());
    }
}
