//! One invocation end to end: budget, pipeline, finalization, and exactly one report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skylift_telemetry::{Metrics, debug_payload};
use tokio::task;
use tracing::{Instrument, error, info, info_span, warn};

use crate::deadline::{DEFAULT_BUFFER, DEFAULT_CHECK_INTERVAL, DeadlineBudget, DeadlineMonitor};
use crate::executor::ActionExecutor;
use crate::finalize::{init_cache_dir, read_preview_mode_id};
use crate::model::{
    DeploymentMode, DeploymentRequest, InvocationContext, LifecycleEvent, RequestType,
};
use crate::patch::{ContentPatch, PatchState};
use crate::pipeline::{DeploymentPipeline, PipelineState};
use crate::reporter::{
    CallbackTransport, ReportToken, ResponseIdentity, ResponseReporter, ResponseStatus,
    RetryPolicy,
};
use crate::store::StoreResolver;

/// Reason reported for delete requests.
pub const DELETE_REASON: &str = "Delete request processed successfully.";
/// Reason of the report sent by the deadline monitor.
pub const EARLY_REPORT_REASON: &str = "Execution approaching deadline, reporting partial success";
const EARLY_REPORT_MESSAGE: &str = "Operation timed out but some assets were deployed successfully";

/// Tunables for one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Margin subtracted from the remaining invocation time.
    pub deadline_buffer: Duration,
    /// Interval between background deadline checks.
    pub check_interval: Duration,
    /// Callback retry schedule.
    pub retry: RetryPolicy,
    /// Script prepended by the content patch.
    pub patch_script_path: Option<PathBuf>,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            deadline_buffer: DEFAULT_BUFFER,
            check_interval: DEFAULT_CHECK_INTERVAL,
            retry: RetryPolicy::default(),
            patch_script_path: None,
        }
    }
}

/// Which report reached the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDelivery {
    /// The handler sent the final report.
    Final {
        /// Whether delivery succeeded.
        delivered: bool,
    },
    /// The deadline monitor sent the report; the final one was suppressed.
    EarlyReport,
}

/// Summary of a handled invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    /// Final pipeline state; `Idle` for delete requests and rejected properties.
    pub state: PipelineState,
    /// Which report was sent.
    pub report: ReportDelivery,
    /// Preview-mode identifier included in a final success report.
    pub preview_mode_id: String,
}

/// Handles lifecycle events.
pub struct InvocationHandler {
    stores: Arc<dyn StoreResolver>,
    transport: Arc<dyn CallbackTransport>,
    metrics: Metrics,
    settings: HandlerSettings,
}

impl InvocationHandler {
    /// Handler over the given stores and callback transport.
    #[must_use]
    pub fn new(
        stores: Arc<dyn StoreResolver>,
        transport: Arc<dyn CallbackTransport>,
        metrics: Metrics,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            stores,
            transport,
            metrics,
            settings,
        }
    }

    /// Handle one event. Exactly one report is sent whatever the outcome.
    pub async fn handle(
        &self,
        event: LifecycleEvent,
        context: InvocationContext,
    ) -> InvocationReport {
        let span = info_span!(
            "invocation",
            request_id = %event.request_id,
            logical_resource_id = %event.logical_resource_id,
            request_type = event.request_type.as_str(),
        );
        self.handle_event(event, context).instrument(span).await
    }

    async fn handle_event(
        &self,
        event: LifecycleEvent,
        context: InvocationContext,
    ) -> InvocationReport {
        debug_payload("event", &event);
        let budget =
            DeadlineBudget::from_remaining(context.remaining_time, self.settings.deadline_buffer);
        info!(
            remaining_ms = context.remaining_time.as_millis(),
            budget_ms = budget.remaining().as_millis(),
            "invocation started"
        );

        let identity = ResponseIdentity::new(&event, &context);
        let reporter = Arc::new(ResponseReporter::new(
            Arc::clone(&self.transport),
            identity.response_url.clone(),
            self.settings.retry,
            self.metrics.clone(),
        ));
        let token = ReportToken::new();

        if event.request_type == RequestType::Delete {
            info!("delete request, no actions to run");
            let envelope =
                identity.envelope(ResponseStatus::Success, DELETE_REASON, BTreeMap::new());
            let delivered = token.try_claim() && reporter.send(&envelope).await;
            return InvocationReport {
                state: PipelineState::Idle,
                report: ReportDelivery::Final { delivered },
                preview_mode_id: String::new(),
            };
        }

        let request = match event.deployment_request() {
            Ok(request) => request,
            Err(err) => {
                let reason = err.report_reason();
                error!(error = %reason, "resource properties rejected");
                let envelope = identity.envelope(ResponseStatus::Failed, &reason, BTreeMap::new());
                let delivered = token.try_claim() && reporter.send(&envelope).await;
                return InvocationReport {
                    state: PipelineState::Idle,
                    report: ReportDelivery::Final { delivered },
                    preview_mode_id: String::new(),
                };
            }
        };

        let mut monitor = DeadlineMonitor::new(budget, self.settings.check_interval);
        {
            let token = token.clone();
            let reporter = Arc::clone(&reporter);
            let envelope = identity.envelope(
                ResponseStatus::Success,
                EARLY_REPORT_REASON,
                BTreeMap::from([
                    ("previewModeId".to_string(), String::new()),
                    ("partialExecution".to_string(), "true".to_string()),
                    ("message".to_string(), EARLY_REPORT_MESSAGE.to_string()),
                ]),
            );
            monitor.arm_early_report(move || async move {
                if !token.try_claim() {
                    return;
                }
                warn!("deadline reached with work in flight, reporting partial success");
                if !reporter.send(&envelope).await {
                    error!("deadline report was not delivered");
                }
            });
        }

        let executor = ActionExecutor::new(Arc::clone(&self.stores), self.metrics.clone())
            .with_patch(self.patch_state(request.deployment_mode.as_ref()));
        let mut pipeline = DeploymentPipeline::new(executor);
        let outcome = pipeline.run(&request.actions, &budget).await;

        let preview_mode_id = if outcome.allows_finalization() {
            finalize_blocking(&request).await
        } else {
            String::new()
        };

        let early_fired = monitor.disarm().await;
        let state = pipeline.state().clone();
        if !token.try_claim() {
            info!(early_fired, "deadline report already sent, final report suppressed");
            return InvocationReport {
                state,
                report: ReportDelivery::EarlyReport,
                preview_mode_id,
            };
        }

        let envelope = identity.envelope(
            outcome.status(),
            outcome.reason(),
            outcome.response_data(&preview_mode_id),
        );
        let delivered = reporter.send(&envelope).await;
        InvocationReport {
            state,
            report: ReportDelivery::Final { delivered },
            preview_mode_id,
        }
    }

    fn patch_state(&self, mode: Option<&DeploymentMode>) -> PatchState {
        if !mode.is_some_and(DeploymentMode::requires_content_patch) {
            return PatchState::Disabled;
        }
        let Some(path) = &self.settings.patch_script_path else {
            warn!("deployment mode requires a content patch but no script is configured");
            return PatchState::Unavailable { path: None };
        };
        match ContentPatch::load(path) {
            Ok(patch) => PatchState::Ready(patch),
            Err(err) => {
                warn!(error = %err.report_reason(), "content patch script unavailable");
                PatchState::Unavailable {
                    path: Some(path.clone()),
                }
            }
        }
    }
}

async fn finalize_blocking(request: &DeploymentRequest) -> String {
    let request = request.clone();
    match task::spawn_blocking(move || finalize(&request)).await {
        Ok(preview_mode_id) => preview_mode_id,
        Err(err) => {
            warn!(error = %err, "finalization task did not finish");
            String::new()
        }
    }
}

fn finalize(request: &DeploymentRequest) -> String {
    if let Some(path) = &request.image_cache_path
        && let Err(err) = init_cache_dir(path)
    {
        warn!(error = %err.report_reason(), "image cache directory not created");
    }
    let Some(manifest) = &request.prerender_manifest_path else {
        return String::new();
    };
    match read_preview_mode_id(manifest) {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err.report_reason(), "preview mode id unavailable");
            String::new()
        }
    }
}
