//! Structured logging for Conveyor
//!
//! Provides structured logging with:
//! - Configurable log levels
//! - Environment-based filtering (`RUST_LOG` wins over the configured level)
//! - JSON, pretty or compact output
//! - Job context spans and events

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::{TelemetryError, TelemetryResult};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// Output format (json, pretty, compact)
    pub format: LogFormat,

    /// Include span open/close events
    pub include_spans: bool,

    /// Include file/line information
    pub include_location: bool,

    /// Include target (module path)
    pub include_target: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable)
    Json,
    /// Pretty format (human-readable, multi-line)
    Pretty,
    /// Compact format (single line)
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(TelemetryError::Config(format!("Unknown log format: {}", s))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_spans: false,
            include_location: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Build from the `[logging]` section of the Conveyor config file
    pub fn from_config(config: &conveyor_core::config::LoggingConfig) -> TelemetryResult<Self> {
        Ok(Self {
            level: config.level.clone(),
            format: config.format.parse()?,
            ..Default::default()
        })
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
            _ => EnvFilter::try_new(&self.level),
        }
        .map_err(|e| TelemetryError::Logging(e.to_string()))
    }
}

/// Initialize the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(config.filter()?)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))?;

    tracing::info!(
        "Logging initialized with level: {}, format: {:?}",
        config.level,
        config.format
    );

    Ok(())
}

/// Log context for a job moving through a queue
#[derive(Debug, Clone)]
pub struct JobLogContext {
    pub job_id: String,
    pub job_name: String,
    pub queue: String,
}

impl JobLogContext {
    pub fn new(job_id: impl ToString, job_name: &str, queue: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            queue: queue.to_string(),
        }
    }

    /// Create a tracing span with this context
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_name = %self.job_name,
            queue = %self.queue
        )
    }
}

/// Log job pushed to the broker
#[macro_export]
macro_rules! log_job_pushed {
    ($job_id:expr, $job_name:expr, $queue:expr) => {
        tracing::info!(
            job_id = %$job_id,
            job_name = %$job_name,
            queue = %$queue,
            event = "job.pushed",
            "Job pushed"
        )
    };
}

/// Log job received from the broker
#[macro_export]
macro_rules! log_job_received {
    ($job_id:expr, $job_name:expr, $queue:expr) => {
        tracing::info!(
            job_id = %$job_id,
            job_name = %$job_name,
            queue = %$queue,
            event = "job.received",
            "Job received"
        )
    };
}

/// Log job handled
#[macro_export]
macro_rules! log_job_completed {
    ($job_id:expr, $job_name:expr, $duration_ms:expr) => {
        tracing::info!(
            job_id = %$job_id,
            job_name = %$job_name,
            duration_ms = $duration_ms,
            event = "job.completed",
            "Job completed"
        )
    };
}

/// Log job handler failure
#[macro_export]
macro_rules! log_job_failed {
    ($job_id:expr, $job_name:expr, $error:expr) => {
        tracing::error!(
            job_id = %$job_id,
            job_name = %$job_name,
            error = %$error,
            event = "job.failed",
            "Job failed"
        )
    };
}

/// Log job with no registered handler
#[macro_export]
macro_rules! log_job_rejected {
    ($job_id:expr, $job_name:expr, $reason:expr) => {
        tracing::warn!(
            job_id = %$job_id,
            job_name = %$job_name,
            reason = %$reason,
            event = "job.rejected",
            "Job rejected"
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_core_config() {
        let core = conveyor_core::config::LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };
        let config = LoggingConfig::from_config(&core).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.enabled);
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LoggingConfig::default().with_level("conveyor=loud");
        if std::env::var(EnvFilter::DEFAULT_ENV).is_err() {
            assert!(config.filter().is_err());
        }
    }

    #[test]
    fn test_disabled_logging_is_noop() {
        let config = LoggingConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(config).is_ok());
    }

    #[test]
    fn test_job_span_fields() {
        let context = JobLogContext::new(42, "ext-simple", "conveyor");
        assert_eq!(context.job_id, "42");
        let _span = context.span();
    }
}
