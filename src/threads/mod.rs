//! threads
//! The runtime's OS threads: a generic cycle loop plus the bodies it runs.

pub mod cycle_loop;
pub mod heartbeat;
pub mod periodic;
pub mod see_think;
pub mod sense_act;
pub mod watchdog;

pub use cycle_loop::{CycleLoop, LoopBody, LoopOptions, Schedule};
pub use heartbeat::Heartbeat;
pub use periodic::PeriodicSleep;
pub use see_think::SeeThink;
pub use sense_act::{FORWARD_CAPACITY, SenseAct, SharedMotion};
pub use watchdog::{StallHandler, Watchdog};
