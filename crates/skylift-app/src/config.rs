//! Environment-derived settings for one invocation.

use std::path::PathBuf;
use std::time::Duration;

use skylift_deploy::{HandlerSettings, InvocationContext};
use skylift_telemetry::{
    DEBUG_LOG_LEVEL, DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, log_format_from_str,
};

use crate::error::{AppError, AppResult};

/// Default remaining invocation time when the host does not provide one.
pub const DEFAULT_REMAINING_TIME_MS: u64 = 900_000;
/// Default log stream name.
pub const DEFAULT_LOG_STREAM: &str = "skylift";

const EVENT_PATH: &str = "SKYLIFT_EVENT_PATH";
const REMAINING_TIME_MS: &str = "SKYLIFT_REMAINING_TIME_MS";
const LOG_STREAM_NAME: &str = "SKYLIFT_LOG_STREAM_NAME";
const PATCH_SCRIPT_PATH: &str = "SKYLIFT_PATCH_SCRIPT_PATH";
const S3_ENDPOINT: &str = "SKYLIFT_S3_ENDPOINT";
const S3_ALLOW_HTTP: &str = "SKYLIFT_S3_ALLOW_HTTP";
const DEBUG: &str = "SKYLIFT_DEBUG";
const LEGACY_DEBUG: &str = "DEBUG";
const LOG_FORMAT: &str = "SKYLIFT_LOG_FORMAT";

/// Settings resolved from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// File holding the event JSON; stdin is read when unset.
    pub event_path: Option<PathBuf>,
    /// Time left before the host terminates the invocation.
    pub remaining_time: Duration,
    /// Log stream identifier.
    pub log_stream_name: String,
    /// Script used by the content patch.
    pub patch_script_path: Option<PathBuf>,
    /// Custom S3-compatible endpoint.
    pub s3_endpoint: Option<String>,
    /// Permit plain HTTP to the S3 endpoint.
    pub s3_allow_http: bool,
    /// Emit debug logs and payload dumps.
    pub debug: bool,
    /// Log output format.
    pub log_format: LogFormat,
}

impl DeployConfig {
    /// Load settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let remaining_ms = match get(REMAINING_TIME_MS) {
            Some(raw) => raw.parse::<u64>().map_err(|_| AppError::InvalidConfig {
                field: REMAINING_TIME_MS,
                reason: "not_a_number",
                value: Some(raw),
            })?,
            None => DEFAULT_REMAINING_TIME_MS,
        };
        let log_format =
            log_format_from_str(get(LOG_FORMAT).as_deref()).unwrap_or_else(LogFormat::infer);

        Ok(Self {
            event_path: get(EVENT_PATH).map(PathBuf::from),
            remaining_time: Duration::from_millis(remaining_ms),
            log_stream_name: get(LOG_STREAM_NAME)
                .unwrap_or_else(|| DEFAULT_LOG_STREAM.to_string()),
            patch_script_path: get(PATCH_SCRIPT_PATH).map(PathBuf::from),
            s3_endpoint: get(S3_ENDPOINT),
            s3_allow_http: env_flag_value(get(S3_ALLOW_HTTP).as_deref()),
            debug: env_flag_value(get(DEBUG).as_deref())
                || env_flag_value(get(LEGACY_DEBUG).as_deref()),
            log_format,
        })
    }

    /// Logging configuration matching these settings.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig<'static> {
        LoggingConfig {
            level: if self.debug {
                DEBUG_LOG_LEVEL
            } else {
                DEFAULT_LOG_LEVEL
            },
            format: self.log_format,
            build_sha: build_sha(),
        }
    }

    /// Handler settings matching these settings.
    #[must_use]
    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            patch_script_path: self.patch_script_path.clone(),
            ..HandlerSettings::default()
        }
    }

    /// Invocation context matching these settings.
    #[must_use]
    pub fn context(&self) -> InvocationContext {
        InvocationContext {
            remaining_time: self.remaining_time,
            log_stream_name: self.log_stream_name.clone(),
        }
    }
}

fn env_flag_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
