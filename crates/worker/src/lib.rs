//! Herald worker process: configuration and logging setup for the binary
//! running the alert scheduler and the delivery worker.

pub mod config;
pub mod logging;
