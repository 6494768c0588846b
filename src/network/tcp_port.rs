//! tcp_port.rs
//! Listening TCP port serving a single viewer connection.
//!
//! A background thread accepts one client at a time and copies whatever it
//! sends into the port buffer under the mutex shared with `send_data`. A new
//! connection, or any bytes from the client, count as a pending request.
//!
//! Writes time out after `WRITE_TIMEOUT`. A viewer that stops reading is
//! dropped instead of blocking the sender.

use std::{
    io::{ErrorKind, Read, Write},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use socket2::{Domain, SockAddr, Socket, Type};

use crate::error::TransportError;
use crate::network::udp_port::{BUFFER_SIZE, NetworkData};

const ACCEPT_POLL: Duration = Duration::from_millis(20);
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

struct PortBuffer {
    data: Box<[u8; BUFFER_SIZE]>,
    size: usize,
    has_data: bool,
    request_pending: bool,
    last_receive: Instant,
    client: Option<TcpStream>,
}

struct Shared {
    buffer: Mutex<PortBuffer>,
    running: AtomicBool,
}

pub struct TcpPort {
    name: &'static str,
    port: u16,
    local: SocketAddr,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl TcpPort {
    pub fn open(name: &'static str, bind_address: Ipv4Addr, port: u16) -> Result<Self, TransportError> {
        let open_err = |source| TransportError::Open { port, source };

        let addr = SocketAddr::V4(SocketAddrV4::new(bind_address, port));
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(open_err)?;
        socket.set_reuse_address(true).map_err(open_err)?;
        #[cfg(unix)]
        {
            socket.set_reuse_port(true).map_err(open_err)?;
        }
        socket.bind(&SockAddr::from(addr)).map_err(open_err)?;
        socket.listen(4).map_err(open_err)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true).map_err(open_err)?;
        let local = listener.local_addr().map_err(open_err)?;

        let shared = Arc::new(Shared {
            buffer: Mutex::new(PortBuffer {
                data: Box::new([0u8; BUFFER_SIZE]),
                size: 0,
                has_data: false,
                request_pending: false,
                last_receive: Instant::now(),
                client: None,
            }),
            running: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("tcp-{name}"))
            .spawn(move || serve(name, listener, thread_shared))
            .map_err(open_err)?;

        info!("TcpPort[{name}]: listening on {local}");
        Ok(Self {
            name,
            port: local.port(),
            local,
            shared,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.buffer.lock().client.is_some()
    }

    /// Bytes received since the previous call, or an empty payload.
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

    /// True once per connection or client message; clears the request.
    pub fn take_request(&self) -> bool {
        std::mem::take(&mut self.shared.buffer.lock().request_pending)
    }

    /// Write all of `bytes` to the connected client.
    pub fn send_data(&self, bytes: &[u8]) -> Result<usize, TransportError> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.port));
        }
        let mut buffer = self.shared.buffer.lock();
        let Some(client) = buffer.client.as_mut() else {
            return Err(TransportError::NotConnected(self.port));
        };
        if let Err(source) = client.write_all(bytes).and_then(|_| client.flush()) {
            warn!("TcpPort[{}]: send failed, dropping client: {source}", self.name);
            buffer.client = None;
            return Err(TransportError::Send {
                port: self.port,
                source,
            });
        }
        Ok(bytes.len())
    }

    pub fn time_since_last_receive(&self) -> Duration {
        self.shared.buffer.lock().last_receive.elapsed()
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.time_since_last_receive() > threshold
    }

    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("TcpPort[{}]: serve thread panicked", self.name);
            }
            self.shared.buffer.lock().client = None;
            debug!("TcpPort[{}]: closed", self.name);
        }
    }
}

impl Drop for TcpPort {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(name: &'static str, listener: TcpListener, shared: Arc<Shared>) {
    let mut reader: Option<TcpStream> = None;
    let mut scratch = vec![0u8; BUFFER_SIZE];

    while shared.running.load(Ordering::Acquire) {
        if reader.is_none() {
            match accept(&listener) {
                Ok(Some((read_half, write_half, peer))) => {
                    info!("TcpPort[{name}]: client {peer} connected");
                    let mut buffer = shared.buffer.lock();
                    buffer.client = Some(write_half);
                    buffer.request_pending = true;
                    buffer.last_receive = Instant::now();
                    drop(buffer);
                    reader = Some(read_half);
                }
                Ok(None) => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!("TcpPort[{name}]: accept failed: {e}");
                    thread::sleep(ACCEPT_POLL);
                }
            }
            continue;
        }
        if shared.buffer.lock().client.is_none() {
            debug!("TcpPort[{name}]: client dropped by sender, closing");
            reader = None;
            continue;
        }
        let Some(stream) = reader.as_mut() else {
            continue;
        };

        match stream.read(&mut scratch) {
            Ok(0) => {
                info!("TcpPort[{name}]: client disconnected");
                shared.buffer.lock().client = None;
                reader = None;
            }
            Ok(size) => {
                let mut buffer = shared.buffer.lock();
                buffer.data[..size].copy_from_slice(&scratch[..size]);
                buffer.size = size;
                buffer.has_data = true;
                buffer.request_pending = true;
                buffer.last_receive = Instant::now();
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!("TcpPort[{name}]: read failed: {e}");
                shared.buffer.lock().client = None;
                reader = None;
            }
        }
    }
}

/// Non-blocking accept. Returns the read side, the write side and the peer.
fn accept(listener: &TcpListener) -> std::io::Result<Option<(TcpStream, TcpStream, SocketAddr)>> {
    match listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(READ_TIMEOUT))?;
            stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
            stream.set_nodelay(true)?;
            let write_half = stream.try_clone()?;
            Ok(Some((stream, write_half, peer)))
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_client_is_not_connected() {
        let port = TcpPort::open("test", Ipv4Addr::LOCALHOST, 0).unwrap();
        assert!(!port.is_connected());
        assert!(!port.take_request());
        assert!(matches!(
            port.send_data(b"frame"),
            Err(TransportError::NotConnected(_))
        ));
    }

    #[test]
    fn test_client_message_is_buffered_and_requests_once() {
        let port = TcpPort::open("test", Ipv4Addr::LOCALHOST, 0).unwrap();
        let mut client = TcpStream::connect(port.local_addr().unwrap()).unwrap();
        client.write_all(b"ready").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut received = NetworkData::default();
        while received.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
            received = port.receive_data();
        }
        assert_eq!(received.data, b"ready");
        assert!(port.take_request());
        assert!(!port.take_request());

        port.send_data(b"frame").unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"frame");
    }

    #[test]
    fn test_viewer_that_never_reads_is_dropped() {
        let port = TcpPort::open("test", Ipv4Addr::LOCALHOST, 0).unwrap();
        let _viewer = TcpStream::connect(port.local_addr().unwrap()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !port.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(port.is_connected());

        // Fill the socket buffers until a write times out.
        let frame = vec![7u8; 64 * 1024];
        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = loop {
            let started = Instant::now();
            let result = port.send_data(&frame);
            assert!(started.elapsed() < Duration::from_secs(2), "send blocked");
            if result.is_err() || Instant::now() > deadline {
                break result;
            }
        };
        assert!(matches!(outcome, Err(TransportError::Send { .. })));
        assert!(!port.is_connected());
        assert!(matches!(
            port.send_data(b"frame"),
            Err(TransportError::NotConnected(_))
        ));
    }
}
