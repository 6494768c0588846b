pub mod cycle_log;
pub mod metrics;
