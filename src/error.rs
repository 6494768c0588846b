//! Error taxonomy for the runtime core.
//!
//! - `ConfigurationError`: startup only, fatal.
//! - `BlackboardError`: role lookups that cannot be satisfied.
//! - `DecodeError`: malformed network payload, the packet is dropped.
//! - `TransportError`: socket failures, the affected port degrades.
//! - `RuntimeError`: everything that can stop construction or `run()`.

use std::io;

use thiserror::Error;

use crate::blackboard::Role;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// A Blackboard role was registered twice.
    #[error("blackboard role {0} registered twice")]
    DuplicateRole(Role),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlackboardError {
    #[error("blackboard role {0} is not registered")]
    Unregistered(Role),

    #[error("blackboard has been torn down")]
    TornDown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated payload: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown job kind tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("bad packet header {0:?}")]
    BadHeader([u8; 4]),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open port {port}: {source}")]
    Open {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("send on port {port} failed: {source}")]
    Send {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("port {0} is closed")]
    Closed(u16),

    #[error("no peer connected on port {0}")]
    NotConnected(u16),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0} port is not enabled")]
    Disabled(&'static str),
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Blackboard(#[from] BlackboardError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    /// A loop thread exited while the orchestrator was waiting on it.
    #[error("{0} loop stopped unexpectedly")]
    LoopStopped(&'static str),

    #[error("failed to install fault handling: {0}")]
    FaultHandling(io::Error),
}
