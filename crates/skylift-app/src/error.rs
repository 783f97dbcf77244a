//! Errors raised before or around the handler run: configuration, event
//! ingestion, and dependency construction.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for the binary's bootstrap path.
pub type AppResult<T> = Result<T, AppError>;

/// Bootstrap failures. Messages stay constant and context lives in fields.
#[derive(Debug, Error)]
pub enum AppError {
    /// An environment variable held an unusable value.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Configuration field (environment variable) name.
        field: &'static str,
        /// Short machine-readable reason.
        reason: &'static str,
        /// Offending value, when available.
        value: Option<String>,
    },
    /// Reading the event failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the IO failure, if any.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// The lifecycle event could not be parsed.
    #[error("lifecycle event parse failed")]
    Event {
        /// Source JSON error.
        source: serde_json::Error,
    },
    /// Logging or metrics could not be set up.
    #[error("telemetry setup failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying telemetry error.
        source: skylift_telemetry::TelemetryError,
    },
    /// Callback transport construction failed.
    #[error("callback transport unavailable")]
    Delivery {
        /// Operation identifier.
        operation: &'static str,
        /// Source delivery error.
        source: skylift_deploy::DeliveryError,
    },
}

impl AppError {
    pub(crate) const fn telemetry(
        operation: &'static str,
        source: skylift_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) fn io(operation: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }
}
