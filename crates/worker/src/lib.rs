//! Task wrapper around the entity synchronizer: configuration, retries and
//! periodic scheduling.

pub mod config;
pub mod retry;
pub mod scheduler;
pub mod telemetry;
