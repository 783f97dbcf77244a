//! Deployment counters.
//!
//! Labelled vectors feed the text exposition. Unlabelled totals back
//! [`MetricsSnapshot`] so callers can assert on counts without parsing output.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus-backed metrics registry shared across the pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    actions_total: IntCounterVec,
    objects_transferred_total: IntCounterVec,
    callback_attempts_total: IntCounterVec,
    totals: Totals,
}

/// Unregistered roll-ups of the labelled counters, read by [`Metrics::snapshot`].
struct Totals {
    actions_completed: IntCounter,
    actions_failed: IntCounter,
    objects_succeeded: IntCounter,
    objects_failed: IntCounter,
    callback_attempts: IntCounter,
}

impl Totals {
    fn new() -> TelemetryResult<Self> {
        Ok(Self {
            actions_completed: total("actions_completed")?,
            actions_failed: total("actions_failed")?,
            objects_succeeded: total("objects_succeeded")?,
            objects_failed: total("objects_failed")?,
            callback_attempts: total("callback_attempts")?,
        })
    }
}

/// Snapshot of the counters most useful in end-of-invocation summaries.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Actions that ran to completion (including skips).
    pub actions_completed: u64,
    /// Actions that raised a fatal error.
    pub actions_failed: u64,
    /// Objects written or deleted successfully.
    pub objects_succeeded: u64,
    /// Objects whose transfer failed.
    pub objects_failed: u64,
    /// Callback delivery attempts, successful or not.
    pub callback_attempts: u64,
}

impl Metrics {
    /// Build a private registry holding the three deployment counter families.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let actions_total = counter_vec(
            "actions_total",
            "Deployment actions executed by type and outcome",
            &["type", "outcome"],
        )?;
        let objects_transferred_total = counter_vec(
            "objects_transferred_total",
            "Objects written or deleted by operation and outcome",
            &["operation", "outcome"],
        )?;
        let callback_attempts_total = counter_vec(
            "callback_attempts_total",
            "Response callback delivery attempts by outcome",
            &["outcome"],
        )?;

        register(&registry, "actions_total", &actions_total)?;
        register(
            &registry,
            "objects_transferred_total",
            &objects_transferred_total,
        )?;
        register(&registry, "callback_attempts_total", &callback_attempts_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                actions_total,
                objects_transferred_total,
                callback_attempts_total,
                totals: Totals::new()?,
            }),
        })
    }

    /// Increment the action counter for the given action type and outcome.
    pub fn inc_action(&self, action_type: &str, outcome: &str) {
        self.inner
            .actions_total
            .with_label_values(&[action_type, outcome])
            .inc();
        if outcome == "failed" {
            self.inner.totals.actions_failed.inc();
        } else {
            self.inner.totals.actions_completed.inc();
        }
    }

    /// Add `count` transferred objects for an operation (`upload`, `delete`) and outcome.
    pub fn add_objects(&self, operation: &str, outcome: &str, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.inner
            .objects_transferred_total
            .with_label_values(&[operation, outcome])
            .inc_by(count);
        if outcome == "failed" {
            self.inner.totals.objects_failed.inc_by(count);
        } else {
            self.inner.totals.objects_succeeded.inc_by(count);
        }
    }

    /// Increment the callback attempt counter.
    pub fn inc_callback_attempt(&self, outcome: &str) {
        self.inner
            .callback_attempts_total
            .with_label_values(&[outcome])
            .inc();
        self.inner.totals.callback_attempts.inc();
    }

    /// Text exposition of every registered family.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Render`] or [`TelemetryError::RenderUtf8`].
    pub fn render(&self) -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the aggregated counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let totals = &self.inner.totals;
        MetricsSnapshot {
            actions_completed: totals.actions_completed.get(),
            actions_failed: totals.actions_failed.get(),
            objects_succeeded: totals.objects_succeeded.get(),
            objects_failed: totals.objects_failed.get(),
            callback_attempts: totals.callback_attempts.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> TelemetryResult<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels).map_err(TelemetryError::counter(name))
}

fn register(registry: &Registry, name: &'static str, collector: &IntCounterVec) -> TelemetryResult<()> {
    registry
        .register(Box::new(collector.clone()))
        .map_err(TelemetryError::register(name))
}

fn total(name: &'static str) -> TelemetryResult<IntCounter> {
    IntCounter::new(name, name).map_err(TelemetryError::counter(name))
}
