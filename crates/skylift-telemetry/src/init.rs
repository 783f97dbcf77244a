//! Subscriber installation for a single invocation.
//!
//! One process handles one lifecycle event, so logging is installed once from
//! `main` and every event carries the build identifier recorded here.

use std::fmt;

use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt as layers, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{TelemetryError, TelemetryResult};

/// Level used when neither `RUST_LOG` nor the debug switch is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Level used when the debug switch is on.
pub const DEBUG_LOG_LEVEL: &str = "debug";

const UNKNOWN_BUILD: &str = "dev";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Output encoding for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log collectors.
    Json,
    /// Human-readable lines for local runs.
    Pretty,
}

impl LogFormat {
    /// Pretty output for debug builds, JSON otherwise.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

/// Parse a configured format.
///
/// `None` means nothing was configured. Unrecognised names resolve to
/// [`LogFormat::infer`].
#[must_use]
pub fn log_format_from_str(value: Option<&str>) -> Option<LogFormat> {
    let value = value?.trim();
    Some(if value.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else if value.eq_ignore_ascii_case("pretty") {
        LogFormat::Pretty
    } else {
        LogFormat::infer()
    })
}

/// Inputs for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Fallback filter directive when `RUST_LOG` is absent.
    pub level: &'a str,
    /// Output encoding.
    pub format: LogFormat,
    /// Build identifier for the process.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::SubscriberInstall`] when a global subscriber is
/// already in place.
pub fn init_logging(config: &LoggingConfig<'_>) -> TelemetryResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));
    let json = config.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| layers::layer().json().with_current_span(true).with_target(false)))
        .with((!json).then(|| layers::layer().compact().with_target(false)))
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall {
            format: config.format,
            source,
        })?;

    // Only a successful install records the SHA.
    let _ = BUILD_SHA.set(config.build_sha.to_owned());
    tracing::debug!(build_sha = config.build_sha, format = %config.format, "logging installed");
    Ok(())
}

/// Build identifier recorded by [`init_logging`], or `dev` before that.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or(UNKNOWN_BUILD, String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!(log_format_from_str(Some("JSON")), Some(LogFormat::Json));
        assert_eq!(log_format_from_str(Some(" pretty ")), Some(LogFormat::Pretty));
        assert_eq!(log_format_from_str(Some("logfmt")), Some(LogFormat::infer()));
        assert_eq!(log_format_from_str(None), None);
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn second_install_is_rejected() {
        let config = LoggingConfig {
            level: DEBUG_LOG_LEVEL,
            format: LogFormat::Pretty,
            build_sha: "abc123",
        };
        let _ = init_logging(&config);
        let err = init_logging(&config);
        assert!(matches!(
            err,
            Err(TelemetryError::SubscriberInstall {
                format: LogFormat::Pretty,
                ..
            })
        ));
    }
}
