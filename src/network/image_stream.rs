//! image_stream.rs
//! Debug image stream: one frame goes out per viewer request.
//!
//! Frame layout, little-endian: `"NUim"`, u16 width, u16 height,
//! f64 timestamp ms, u32 pixel byte count, pixel bytes.

use std::net::{Ipv4Addr, SocketAddr};

use log::trace;

use crate::error::{DecodeError, TransportError};
use crate::jobs::codec::ByteReader;
use crate::network::tcp_port::TcpPort;

pub const IMAGE_HEADER: [u8; 4] = *b"NUim";

#[derive(Debug, Clone, PartialEq)]
pub struct NuImage {
    pub width: u16,
    pub height: u16,
    pub time_ms: f64,
    pub pixels: Vec<u8>,
}

impl NuImage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + self.pixels.len());
        out.extend_from_slice(&IMAGE_HEADER);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.time_ms.to_le_bytes());
        out.extend_from_slice(&(self.pixels.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.pixels);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let header = reader.header()?;
        if header != IMAGE_HEADER {
            return Err(DecodeError::BadHeader(header));
        }
        let width = reader.u16()?;
        let height = reader.u16()?;
        let time_ms = reader.f64()?;
        let count = reader.u32()? as usize;
        let pixels = reader.take(count)?.to_vec();
        reader.finish()?;
        Ok(Self {
            width,
            height,
            time_ms,
            pixels,
        })
    }
}

pub struct ImageStreamPort {
    port: TcpPort,
}

impl ImageStreamPort {
    pub fn open(bind_address: Ipv4Addr, port: u16) -> Result<Self, TransportError> {
        Ok(Self {
            port: TcpPort::open("image-stream", bind_address, port)?,
        })
    }

    /// Send `image` if the viewer asked for a frame since the last send.
    pub fn offer(&self, image: &NuImage) -> Result<bool, TransportError> {
        if !self.port.take_request() {
            return Ok(false);
        }
        let _ = self.port.receive_data();
        self.port.send_data(&image.encode())?;
        trace!(
            "ImageStream: sent {}x{} frame @ {:.0}ms",
            image.width, image.height, image.time_ms
        );
        Ok(true)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.port.local_addr()
    }

    pub fn tcp(&self) -> &TcpPort {
        &self.port
    }
}
