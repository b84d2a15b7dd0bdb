//! Runtime glue that wires configuration, telemetry, run orchestration and
//! the signal-aware runner.

pub mod config;
pub mod pipeline;
pub mod runner;
pub mod telemetry;
