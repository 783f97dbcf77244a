//! Delivery of the single status report to the caller's callback URL.
//!
//! # Design
//! - `ReportToken` is the only state shared between the pipeline and the
//!   deadline monitor; whoever claims it first sends the report.
//! - Delivery retries with exponential backoff and gives up after the last attempt.
//! - `CallbackTransport` isolates the HTTP client so delivery can be scripted in tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use skylift_telemetry::{Metrics, debug_payload};
use tokio::time;
use tracing::{error, info, warn};

use crate::error::DeliveryError;
use crate::model::{InvocationContext, LifecycleEvent};

/// Overall status of the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// `SUCCESS`
    Success,
    /// `FAILED`
    Failed,
}

/// JSON body of the callback request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    /// Invocation status.
    pub status: ResponseStatus,
    /// Human-readable reason.
    pub reason: String,
    /// Physical resource identifier.
    pub physical_resource_id: String,
    /// Stack identifier echoed from the event.
    pub stack_id: String,
    /// Request identifier echoed from the event.
    pub request_id: String,
    /// Logical resource identifier echoed from the event.
    pub logical_resource_id: String,
    /// Free-form string attributes.
    pub data: BTreeMap<String, String>,
}

/// Identity fields shared by every envelope of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseIdentity {
    /// Callback URL.
    pub response_url: String,
    /// Stack identifier.
    pub stack_id: String,
    /// Request identifier.
    pub request_id: String,
    /// Logical resource identifier.
    pub logical_resource_id: String,
    /// Physical resource identifier, defaulted to the log stream name.
    pub physical_resource_id: String,
    /// Log stream referenced by the empty-reason fallback.
    pub log_stream_name: String,
}

impl ResponseIdentity {
    /// Capture the identity of `event`.
    #[must_use]
    pub fn new(event: &LifecycleEvent, context: &InvocationContext) -> Self {
        Self {
            response_url: event.response_url.clone(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| context.log_stream_name.clone()),
            log_stream_name: context.log_stream_name.clone(),
        }
    }

    /// Build an envelope; an empty reason points at the log stream instead.
    #[must_use]
    pub fn envelope(
        &self,
        status: ResponseStatus,
        reason: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> ResponseEnvelope {
        let mut reason = reason.into();
        if reason.is_empty() {
            reason = format!("See the details in log stream: {}", self.log_stream_name);
        }
        ResponseEnvelope {
            status,
            reason,
            physical_resource_id: self.physical_resource_id.clone(),
            stack_id: self.stack_id.clone(),
            request_id: self.request_id.clone(),
            logical_resource_id: self.logical_resource_id.clone(),
            data,
        }
    }
}

/// One-shot claim on the right to send the status report.
#[derive(Debug, Clone, Default)]
pub struct ReportToken {
    claimed: Arc<AtomicBool>,
}

impl ReportToken {
    /// Unclaimed token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the token; only the first caller across all clones gets `true`.
    #[must_use]
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether any clone has claimed the token.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// Retry schedule for callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failed attempt; doubled after each further failure.
    pub base_delay: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Sends a serialized envelope to the callback URL.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    /// Perform one delivery attempt.
    async fn put(&self, url: &str, body: String) -> Result<(), DeliveryError>;
}

/// [`CallbackTransport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpCallbackTransport {
    client: Client,
}

impl HttpCallbackTransport {
    /// Use an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a transport with a default client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn build() -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .build()
            .map_err(|source| DeliveryError::Client { source })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl CallbackTransport for HttpCallbackTransport {
    async fn put(&self, url: &str, body: String) -> Result<(), DeliveryError> {
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                url: url.to_string(),
                source: source.without_url(),
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(DeliveryError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Delivers envelopes with retry and backoff.
pub struct ResponseReporter {
    transport: Arc<dyn CallbackTransport>,
    url: String,
    policy: RetryPolicy,
    metrics: Metrics,
}

impl ResponseReporter {
    /// Reporter for `url`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn CallbackTransport>,
        url: impl Into<String>,
        policy: RetryPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            policy,
            metrics,
        }
    }

    /// Deliver `envelope`; returns whether any attempt succeeded.
    pub async fn send(&self, envelope: &ResponseEnvelope) -> bool {
        debug_payload("response", envelope);
        let body = match serde_json::to_string(envelope) {
            Ok(body) => body,
            Err(source) => {
                let err = DeliveryError::Serialize { source };
                error!(error = %err.report_reason(), "cannot deliver response");
                return false;
            }
        };

        for attempt in 1..=self.policy.attempts {
            let result = time::timeout(
                self.policy.attempt_timeout,
                self.transport.put(&self.url, body.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Timeout {
                    url: self.url.clone(),
                    timeout_ms: self.policy.attempt_timeout.as_millis(),
                })
            });
            match result {
                Ok(()) => {
                    self.metrics.inc_callback_attempt("delivered");
                    info!(attempt, status = ?envelope.status, "response delivered");
                    return true;
                }
                Err(err) => {
                    self.metrics.inc_callback_attempt("failed");
                    warn!(
                        attempt,
                        attempts = self.policy.attempts,
                        error = %err.report_reason(),
                        "response delivery attempt failed"
                    );
                    if attempt < self.policy.attempts {
                        let delay = self.policy.backoff(attempt);
                        info!(delay_ms = delay.as_millis(), "retrying response delivery");
                        time::sleep(delay).await;
                    }
                }
            }
        }
        error!(
            attempts = self.policy.attempts,
            "response delivery abandoned"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::PUT;
    use httpmock::prelude::*;

    fn identity(physical: Option<&str>) -> ResponseIdentity {
        let event = LifecycleEvent {
            request_type: crate::model::RequestType::Create,
            resource_properties: serde_json::Value::Null,
            response_url: "http://callback/put".to_string(),
            stack_id: "stack".to_string(),
            request_id: "req".to_string(),
            logical_resource_id: "Assets".to_string(),
            physical_resource_id: physical.map(str::to_string),
        };
        let context = InvocationContext {
            remaining_time: Duration::from_secs(60),
            log_stream_name: "stream-1".to_string(),
        };
        ResponseIdentity::new(&event, &context)
    }

    #[test]
    fn envelope_serializes_with_callback_field_names() -> anyhow::Result<()> {
        let envelope = identity(None).envelope(
            ResponseStatus::Success,
            "done",
            BTreeMap::from([("previewModeId".to_string(), "p".to_string())]),
        );
        let value = serde_json::to_value(&envelope)?;
        assert_eq!(value["Status"], "SUCCESS");
        assert_eq!(value["Reason"], "done");
        assert_eq!(value["PhysicalResourceId"], "stream-1");
        assert_eq!(value["LogicalResourceId"], "Assets");
        assert_eq!(value["Data"]["previewModeId"], "p");
        Ok(())
    }

    #[test]
    fn empty_reason_points_to_log_stream() {
        let envelope =
            identity(Some("phys")).envelope(ResponseStatus::Failed, "", BTreeMap::new());
        assert_eq!(envelope.reason, "See the details in log stream: stream-1");
        assert_eq!(envelope.physical_resource_id, "phys");
    }

    #[test]
    fn token_is_claimed_once_across_clones() {
        let token = ReportToken::new();
        let other = token.clone();
        assert!(!other.is_claimed());
        assert!(token.try_claim());
        assert!(!other.try_claim());
        assert!(!token.try_claim());
        assert!(other.is_claimed());
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn http_transport_puts_body_to_callback() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/callback");
            then.status(200);
        });
        let transport = HttpCallbackTransport::build()?;
        transport
            .put(&server.url("/callback"), "{\"Status\":\"SUCCESS\"}".to_string())
            .await?;
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn http_transport_reports_rejections() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(PUT).path("/callback");
            then.status(403);
        });
        let transport = HttpCallbackTransport::build()?;
        let result = transport
            .put(&server.url("/callback"), "{}".to_string())
            .await;
        assert!(matches!(
            result,
            Err(DeliveryError::Status { status: 403, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn http_transport_errors_do_not_leak_the_signature() -> anyhow::Result<()> {
        let transport = HttpCallbackTransport::build()?;
        let result = transport
            .put(
                "http://127.0.0.1:9/callback?X-Amz-Signature=secret",
                "{}".to_string(),
            )
            .await;
        let err = match result {
            Err(err @ DeliveryError::Transport { .. }) => err,
            other => anyhow::bail!("expected a transport failure, got {other:?}"),
        };
        let reason = err.report_reason();
        assert!(reason.starts_with("request to http://127.0.0.1:9/callback failed"));
        assert!(!reason.contains("secret"));
        Ok(())
    }
}
