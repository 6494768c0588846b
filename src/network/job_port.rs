//! job_port.rs
//! Job distribution over UDP: outgoing JobLists are encoded with the job
//! codec, incoming datagrams are decoded and appended to the Blackboard
//! JobList as one batch. A malformed datagram is dropped whole.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, warn};

use crate::error::TransportError;
use crate::jobs::{Job, JobList, codec};
use crate::network::udp_port::{PacketHandler, UdpPort, UdpPortOptions};
use crate::utils::cycle_log::{CycleEventKind, CycleLog};

pub struct JobPort {
    port: UdpPort,
    received_jobs: Arc<AtomicU64>,
    decode_errors: Arc<AtomicU64>,
}

impl JobPort {
    pub fn open(options: UdpPortOptions, jobs: Arc<JobList>) -> Result<Self, TransportError> {
        Self::open_logged(options, jobs, None)
    }

    /// As `open`, also recording rejected datagrams in `cycle_log`.
    pub fn open_logged(
        options: UdpPortOptions,
        jobs: Arc<JobList>,
        cycle_log: Option<CycleLog>,
    ) -> Result<Self, TransportError> {
        let received_jobs = Arc::new(AtomicU64::new(0));
        let decode_errors = Arc::new(AtomicU64::new(0));

        let received = Arc::clone(&received_jobs);
        let errors = Arc::clone(&decode_errors);
        let handler: PacketHandler = Box::new(move |bytes: &[u8], from: SocketAddr| {
            match jobs.extend_from_bytes(bytes) {
                Ok(count) => {
                    received.fetch_add(count as u64, Ordering::Relaxed);
                    debug!("JobPort: {count} jobs from {from}");
                }
                Err(e) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!("JobPort: dropped {} bytes from {from}: {e}", bytes.len());
                    if let Some(log) = &cycle_log {
                        log.record("jobs", CycleEventKind::DecodeDrop, bytes.len() as f64);
                    }
                }
            }
        });

        Ok(Self {
            port: UdpPort::open("jobs", options, Some(handler))?,
            received_jobs,
            decode_errors,
        })
    }

    /// Encode and send a batch. Empty batches are not sent.
    pub fn send(&self, jobs: &[Job]) -> Result<usize, TransportError> {
        if jobs.is_empty() {
            return Ok(0);
        }
        self.port.send_data(&codec::encode_jobs(jobs))
    }

    /// Send the current contents of `list` without draining it.
    pub fn send_list(&self, list: &JobList) -> Result<usize, TransportError> {
        if list.is_empty() {
            return Ok(0);
        }
        self.port.send_data(&list.encode())
    }

    /// Unicast to `address` on this port's number.
    pub fn set_target_address(&self, address: Ipv4Addr) {
        self.port
            .set_target(SocketAddrV4::new(address, self.port.target().port()));
    }

    pub fn set_target(&self, target: SocketAddrV4) {
        self.port.set_target(target);
    }

    pub fn set_broadcast(&self) {
        self.port.set_broadcast();
    }

    pub fn udp(&self) -> &UdpPort {
        &self.port
    }

    pub fn received_jobs(&self) -> u64 {
        self.received_jobs.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.port.is_stale(threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{net::UdpSocket, thread, time::Instant};

    #[test]
    fn test_rejected_datagram_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drops.csv");
        let log = CycleLog::new();
        log.start_consumer(path.clone()).unwrap();

        let jobs = Arc::new(JobList::new());
        let options = UdpPortOptions {
            bind_address: Ipv4Addr::LOCALHOST,
            port: 0,
            target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9),
        };
        let port = JobPort::open_logged(options, Arc::clone(&jobs), Some(log.clone())).unwrap();

        let raw = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        raw.send_to(&[0xff; 7], (Ipv4Addr::LOCALHOST, port.udp().port()))
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while port.decode_errors() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(port.decode_errors(), 1);
        assert!(jobs.is_empty());

        log.stop_consumer();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("jobs,decode_drop,7"), "{text}");
    }
}
