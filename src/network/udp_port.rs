//! udp_port.rs
//! One UDP socket with a background receive loop and a single-slot buffer.
//!
//! The receive thread blocks on the socket (with a short read timeout so it
//! notices `stop`), then copies the datagram into the shared buffer, records
//! the receive time and raises the "has data" flag. `receive_data` and
//! `send_data` take the same mutex, so a send never interleaves with a copy.
//! Only the most recent datagram is kept.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::TransportError;

pub const BUFFER_SIZE: usize = 10 * 1024;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Called on the receive thread for every datagram, after it is buffered.
pub type PacketHandler = Box<dyn FnMut(&[u8], SocketAddr) + Send>;

/// Payload returned by `receive_data`; `size == 0` means nothing new.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkData {
    pub data: Vec<u8>,
    pub size: usize,
}

impl NetworkData {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UdpPortOptions {
    pub bind_address: Ipv4Addr,
    pub port: u16,
    /// Initial send target; `send_data` goes here until changed.
    pub target: SocketAddrV4,
}

impl UdpPortOptions {
    /// Bind on all interfaces and broadcast to the same port number.
    pub fn broadcast(port: u16) -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            port,
            target: SocketAddrV4::new(Ipv4Addr::BROADCAST, port),
        }
    }
}

struct PortBuffer {
    data: Box<[u8; BUFFER_SIZE]>,
    size: usize,
    has_data: bool,
    last_receive: Instant,
    received: u64,
}

struct Shared {
    socket: UdpSocket,
    buffer: Mutex<PortBuffer>,
    running: AtomicBool,
}

pub struct UdpPort {
    name: &'static str,
    port: u16,
    shared: Arc<Shared>,
    target: Mutex<SocketAddrV4>,
    broadcast: SocketAddrV4,
    handle: Option<JoinHandle<()>>,
}

impl UdpPort {
    pub fn open(
        name: &'static str,
        options: UdpPortOptions,
        handler: Option<PacketHandler>,
    ) -> Result<Self, TransportError> {
        let open_err = |source| TransportError::Open {
            port: options.port,
            source,
        };

        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(open_err)?;
        socket.set_reuse_address(true).map_err(open_err)?;
        socket.set_broadcast(true).map_err(open_err)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT)).map_err(open_err)?;
        let bind = SocketAddr::V4(SocketAddrV4::new(options.bind_address, options.port));
        socket.bind(&SockAddr::from(bind)).map_err(open_err)?;
        let socket: UdpSocket = socket.into();

        let local = socket.local_addr().map_err(open_err)?;
        let shared = Arc::new(Shared {
            socket,
            buffer: Mutex::new(PortBuffer {
                data: Box::new([0u8; BUFFER_SIZE]),
                size: 0,
                has_data: false,
                last_receive: Instant::now(),
                received: 0,
            }),
            running: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("udp-{name}"))
            .spawn(move || receive_loop(name, thread_shared, handler))
            .map_err(open_err)?;

        info!("UdpPort[{name}]: listening on {local}");
        Ok(Self {
            name,
            port: local.port(),
            shared,
            target: Mutex::new(options.target),
            broadcast: options.target,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bound port number (the real one when opened on port 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.socket.local_addr().ok()
    }

    /// Latest datagram since the previous call, or an empty payload. Never blocks on the network.
    pub fn receive_data(&self) -> NetworkData {
        let mut buffer = self.shared.buffer.lock();
        if !buffer.has_data {
            return NetworkData::default();
        }
        buffer.has_data = false;
        let size = buffer.size;
        NetworkData {
            data: buffer.data[..size].to_vec(),
            size,
        }
    }

    /// Send to the current target.
    pub fn send_data(&self, bytes: &[u8]) -> Result<usize, TransportError> {
        let target = *self.target.lock();
        self.send_to(bytes, SocketAddr::V4(target))
    }

    pub fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<usize, TransportError> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.port));
        }
        let _buffer = self.shared.buffer.lock();
        let sent = self
            .shared
            .socket
            .send_to(bytes, addr)
            .map_err(|source| TransportError::Send {
                port: self.port,
                source,
            })?;
        trace!("UdpPort[{}]: sent {sent} bytes to {addr}", self.name);
        Ok(sent)
    }

    pub fn set_target(&self, addr: SocketAddrV4) {
        *self.target.lock() = addr;
        debug!("UdpPort[{}]: target now {addr}", self.name);
    }

    /// Revert to the broadcast target given at construction.
    pub fn set_broadcast(&self) {
        self.set_target(self.broadcast);
    }

    pub fn target(&self) -> SocketAddrV4 {
        *self.target.lock()
    }

    pub fn time_since_last_receive(&self) -> Duration {
        self.shared.buffer.lock().last_receive.elapsed()
    }

    /// Nothing received for longer than `threshold` (counted from open if never).
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.time_since_last_receive() > threshold
    }

    pub fn packets_received(&self) -> u64 {
        self.shared.buffer.lock().received
    }

    /// Stop the receive loop and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("UdpPort[{}]: receive thread panicked", self.name);
            }
            debug!("UdpPort[{}]: closed", self.name);
        }
    }
}

impl Drop for UdpPort {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(name: &'static str, shared: Arc<Shared>, mut handler: Option<PacketHandler>) {
    let mut scratch = vec![0u8; BUFFER_SIZE];
    while shared.running.load(Ordering::Acquire) {
        let (size, from) = match shared.socket.recv_from(&mut scratch) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(e) => {
                warn!("UdpPort[{name}]: receive failed: {e}");
                thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };

        {
            let mut buffer = shared.buffer.lock();
            buffer.data[..size].copy_from_slice(&scratch[..size]);
            buffer.size = size;
            buffer.has_data = true;
            buffer.last_receive = Instant::now();
            buffer.received += 1;
        }
        trace!("UdpPort[{name}]: {size} bytes from {from}");

        if let Some(handler) = handler.as_mut() {
            handler(&scratch[..size], from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> UdpPortOptions {
        UdpPortOptions {
            bind_address: Ipv4Addr::LOCALHOST,
            port: 0,
            target: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9),
        }
    }

    #[test]
    fn test_nothing_received_is_zero_size() {
        let port = UdpPort::open("test", loopback(), None).unwrap();
        assert!(port.port() != 0);
        assert!(port.receive_data().is_empty());
        assert_eq!(port.packets_received(), 0);
    }

    #[test]
    fn test_stale_before_first_packet() {
        let port = UdpPort::open("test", loopback(), None).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(port.is_stale(Duration::from_millis(10)));
        assert!(!port.is_stale(Duration::from_secs(10)));
    }

    #[test]
    fn test_send_after_stop_is_closed() {
        let mut port = UdpPort::open("test", loopback(), None).unwrap();
        port.stop();
        port.stop();
        assert!(matches!(
            port.send_data(b"x"),
            Err(TransportError::Closed(_))
        ));
    }
}
