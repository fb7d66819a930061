//! Conveyor Telemetry - Logging setup
//!
//! This crate wires `tracing` for Conveyor binaries and tests:
//! - Global subscriber setup with JSON, pretty or compact output
//! - Job context spans
//! - Structured `log_job_*` event macros

pub mod logging;

pub use logging::{init_logging, JobLogContext, LogFormat, LoggingConfig};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
