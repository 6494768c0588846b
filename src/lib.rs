//! # NUbot runtime core
//!
//! Concurrency and lifecycle skeleton of a soccer-robot control program:
//!
//! - **Blackboard:** typed registry of the shared data every component reads and writes.
//! - **Jobs:** commands between components and over the network, with a binary codec.
//! - **Threads:** a sense-act loop, a see-think loop and a watchdog, each on its own OS thread.
//! - **Runtime:** the `NuBot` orchestrator, its shutdown sequence and fault handling.
//! - **Network:** UDP/TCP ports for the game controller, teammates, Jobs and the image stream.
//!
//! A `Platform` implementation binds the runtime to hardware or a simulator;
//! `SimulatedPlatform` ships with the crate.

pub mod blackboard;
pub mod config;
pub mod error;
pub mod jobs;
pub mod modules;
pub mod network;
pub mod platform;
pub mod runtime;
pub mod threads;
pub mod utils;

pub use blackboard::{Blackboard, Role};
pub use config::RuntimeConfig;
pub use error::{
    BlackboardError, ConfigurationError, DecodeError, RuntimeError, TransportError,
};
pub use jobs::{Job, JobKind, JobList};
pub use modules::Modules;
pub use network::NetworkIo;
pub use platform::{Platform, SimulatedPlatform};
pub use runtime::{FaultCause, LifecycleState, NuBot, RunMode, ShutdownHandle};
