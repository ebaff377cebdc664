//! Logging initialization
//!
//! Installs a `tracing` subscriber with an `EnvFilter` (overridable through
//! `RUST_LOG`) and either JSON or human-readable output.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,registry_rewriter=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directives; falls back to `RUST_LOG`, then [`DEFAULT_LOG_FILTER`]
    pub filter: Option<String>,
}

impl TelemetryConfig {
    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        }
    }
}

/// Initialize the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}
