//! Error types for logging and metrics setup.

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

use crate::init::LogFormat;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Failures raised while wiring logging or rendering counters.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install log subscriber")]
    SubscriberInstall {
        /// Output format that was being installed.
        format: LogFormat,
        /// Underlying subscriber error.
        #[source]
        source: TryInitError,
    },
    /// The counter definition was rejected.
    #[error("invalid counter definition")]
    Counter {
        /// Counter name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// The counter could not be added to the registry.
    #[error("failed to register counter")]
    Register {
        /// Counter name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// Text exposition encoding failed.
    #[error("failed to render metrics")]
    Render {
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// Rendered exposition was not UTF-8.
    #[error("rendered metrics were not utf-8")]
    RenderUtf8 {
        /// Underlying conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) fn counter(name: &'static str) -> impl FnOnce(prometheus::Error) -> Self {
        move |source| Self::Counter { name, source }
    }

    pub(crate) fn register(name: &'static str) -> impl FnOnce(prometheus::Error) -> Self {
        move |source| Self::Register { name, source }
    }

    /// Metric name tied to the failure, when there is one.
    #[must_use]
    pub const fn metric(&self) -> Option<&'static str> {
        match self {
            Self::Counter { name, .. } | Self::Register { name, .. } => Some(*name),
            Self::SubscriberInstall { .. } | Self::Render { .. } | Self::RenderUtf8 { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn counter_errors_keep_the_metric_name() {
        let err = TelemetryError::counter("actions_total")(prometheus::Error::Msg("bad".into()));
        assert_eq!(err.to_string(), "invalid counter definition");
        assert_eq!(err.metric(), Some("actions_total"));
        assert!(err.source().is_some());

        let err = TelemetryError::register("actions_total")(prometheus::Error::AlreadyReg);
        assert_eq!(err.to_string(), "failed to register counter");
        assert_eq!(err.metric(), Some("actions_total"));
    }

    #[test]
    fn render_errors_have_no_metric() -> anyhow::Result<()> {
        let utf8 = String::from_utf8(vec![0xff, 0xfe])
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected a utf-8 failure"))?;
        let err = TelemetryError::RenderUtf8 { source: utf8 };
        assert_eq!(err.to_string(), "rendered metrics were not utf-8");
        assert_eq!(err.metric(), None);
        Ok(())
    }
}
