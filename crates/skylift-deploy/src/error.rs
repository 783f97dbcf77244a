//! # Design
//!
//! - Provide structured, constant-message errors for the deployment pipeline.
//! - Capture operation context (paths, keys, counts) so failures are reproducible.
//! - Render caller-facing reasons separately via `report_reason`, keeping `Display` stable.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors produced while executing deployment actions.
#[derive(Debug, Error)]
pub enum DeployError {
    /// IO failures while interacting with the filesystem.
    #[error("deploy io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("deploy walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// JSON parsing failures for manifests.
    #[error("deploy json failure")]
    Json {
        /// Operation that triggered the JSON failure.
        operation: &'static str,
        /// Path involved in the JSON failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The event's resource properties did not describe a deployment.
    #[error("invalid resource properties")]
    InvalidRequest {
        /// Underlying decode error.
        source: serde_json::Error,
    },
    /// Source and destination counts disagreed after a transfer.
    #[error("transfer completeness check failed")]
    CompletenessMismatch {
        /// Action type that failed verification.
        action: &'static str,
        /// Number of files found in the source tree.
        expected: usize,
        /// Number of files present or transferred at the destination.
        actual: usize,
    },
    /// Object store request failures.
    #[error("object store failure")]
    Store {
        /// Operation that triggered the store failure.
        operation: &'static str,
        /// Object key involved in the failure.
        key: String,
        /// Underlying object store error.
        source: object_store::Error,
    },
    /// An object store client could not be built for a bucket.
    #[error("object store unavailable")]
    StoreUnavailable {
        /// Bucket the client was requested for.
        bucket: String,
        /// Underlying object store error.
        source: object_store::Error,
    },
    /// No store is registered for the requested bucket.
    #[error("unknown destination bucket")]
    UnknownBucket {
        /// Bucket name supplied by the action.
        bucket: String,
    },
    /// A computed object key was rejected.
    #[error("invalid object key")]
    InvalidKey {
        /// Key that failed to parse.
        key: String,
        /// Underlying path error.
        source: object_store::path::Error,
    },
    /// The deployment mode requires a content patch that could not be loaded.
    #[error("content patch unavailable")]
    PatchUnavailable {
        /// Configured patch script path, when one was provided.
        path: Option<PathBuf>,
    },
    /// Input validation failures.
    #[error("deploy invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// A blocking task panicked or was cancelled.
    #[error("deploy background task failed")]
    Join {
        /// Operation that was running on the blocking pool.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl DeployError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn store(
        operation: &'static str,
        key: impl Into<String>,
        source: object_store::Error,
    ) -> Self {
        Self::Store {
            operation,
            key: key.into(),
            source,
        }
    }

    pub(crate) const fn join(operation: &'static str, source: tokio::task::JoinError) -> Self {
        Self::Join { operation, source }
    }

    /// Human-readable reason suitable for the caller's status report.
    #[must_use]
    pub fn report_reason(&self) -> String {
        match self {
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::Walkdir {
                operation,
                path,
                source,
            } => format!("{operation} could not walk {}: {source}", path.display()),
            Self::Json {
                operation,
                path,
                source,
            } => format!("{operation} could not parse {}: {source}", path.display()),
            Self::InvalidRequest { source } => format!("invalid resource properties: {source}"),
            Self::CompletenessMismatch {
                action,
                expected,
                actual,
            } => {
                let detail = if actual < expected {
                    format!("missing {}", expected - actual)
                } else {
                    format!("unexpected {}", actual - expected)
                };
                format!(
                    "file count mismatch after {action}: source {expected}, transferred {actual}, {detail}"
                )
            }
            Self::Store {
                operation,
                key,
                source,
            } => format!("{operation} failed for key {key}: {source}"),
            Self::StoreUnavailable { bucket, source } => {
                format!("object store for bucket {bucket} unavailable: {source}")
            }
            Self::UnknownBucket { bucket } => format!("no object store configured for {bucket}"),
            Self::InvalidKey { key, source } => format!("invalid object key {key}: {source}"),
            Self::PatchUnavailable { path: Some(path) } => {
                format!("content patch script {} could not be loaded", path.display())
            }
            Self::PatchUnavailable { path: None } => {
                "deployment mode requires a content patch script but none is configured".to_string()
            }
            Self::InvalidInput {
                field,
                reason,
                value,
            } => match value {
                Some(value) => format!("invalid {field} ({reason}): {value}"),
                None => format!("invalid {field} ({reason})"),
            },
            Self::Join { operation, source } => format!("{operation} did not finish: {source}"),
        }
    }
}

/// Errors raised while delivering the response callback.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Building the HTTP client failed.
    #[error("callback client construction failed")]
    Client {
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The request could not be sent or the connection failed.
    #[error("callback request failed")]
    Transport {
        /// Callback URL.
        url: String,
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The callback endpoint responded with a non-success status.
    #[error("callback rejected")]
    Status {
        /// Callback URL.
        url: String,
        /// HTTP status code returned by the endpoint.
        status: u16,
    },
    /// The attempt exceeded its timeout.
    #[error("callback attempt timed out")]
    Timeout {
        /// Callback URL.
        url: String,
        /// Per-attempt timeout in milliseconds.
        timeout_ms: u128,
    },
    /// The envelope could not be serialised.
    #[error("callback body serialisation failed")]
    Serialize {
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

impl DeliveryError {
    /// Human-readable description including the captured context.
    ///
    /// Callback URLs are pre-signed, so only the part before the query string
    /// is rendered.
    #[must_use]
    pub fn report_reason(&self) -> String {
        match self {
            Self::Client { source } => format!("failed to build callback client: {source}"),
            Self::Transport { url, source } => {
                format!("request to {} failed: {source}", without_query(url))
            }
            Self::Status { url, status } => {
                format!("{} responded with status {status}", without_query(url))
            }
            Self::Timeout { url, timeout_ms } => {
                format!("request to {} timed out after {timeout_ms}ms", without_query(url))
            }
            Self::Serialize { source } => format!("failed to serialise response: {source}"),
        }
    }
}

fn without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
