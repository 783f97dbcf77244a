use std::path::Path;
use std::sync::Arc;

use skylift_deploy::{
    CallbackTransport, HttpCallbackTransport, InvocationHandler, InvocationReport, LifecycleEvent,
    StoreResolver,
};
use skylift_telemetry::{Metrics, init_logging};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::config::DeployConfig;
use crate::error::{AppError, AppResult};
use crate::stores::S3StoreResolver;

/// Dependencies required to handle one invocation.
pub(crate) struct BootstrapDependencies {
    config: DeployConfig,
    event: LifecycleEvent,
    stores: Arc<dyn StoreResolver>,
    transport: Arc<dyn CallbackTransport>,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies for `config`, reading the event from its source.
    pub(crate) async fn from_config(config: DeployConfig) -> AppResult<Self> {
        let raw = read_event_source(config.event_path.as_deref()).await?;
        let event = parse_event(&raw)?;
        let stores = Arc::new(
            S3StoreResolver::new().with_endpoint(config.s3_endpoint.clone(), config.s3_allow_http),
        );
        let transport =
            Arc::new(HttpCallbackTransport::build().map_err(|source| AppError::Delivery {
                operation: "callback.build",
                source,
            })?);
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            event,
            stores,
            transport,
            metrics,
        })
    }
}

/// Entry point for a single invocation.
///
/// # Errors
///
/// Returns an error if configuration, logging, or event loading fails. Deployment
/// failures are reported through the callback instead.
pub async fn run_app() -> AppResult<()> {
    let config = DeployConfig::from_env()?;
    init_logging(&config.logging()).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let dependencies = BootstrapDependencies::from_config(config).await?;
    run_app_with(dependencies).await.map(|_| ())
}

/// Invocation sequence over injected dependencies.
pub(crate) async fn run_app_with(
    dependencies: BootstrapDependencies,
) -> AppResult<InvocationReport> {
    let BootstrapDependencies {
        config,
        event,
        stores,
        transport,
        metrics,
    } = dependencies;

    info!(
        request_type = event.request_type.as_str(),
        actions = event
            .resource_properties
            .get("actions")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len),
        "skylift invocation starting"
    );
    let handler = InvocationHandler::new(
        stores,
        transport,
        metrics.clone(),
        config.handler_settings(),
    );
    let report = handler.handle(event, config.context()).await;

    match metrics.render() {
        Ok(rendered) => debug!(metrics = %rendered, "invocation metrics"),
        Err(err) => warn!(error = %err, "metrics rendering failed"),
    }
    info!(
        report = ?report.report,
        metrics = ?metrics.snapshot(),
        "skylift invocation finished"
    );
    Ok(report)
}

async fn read_event_source(path: Option<&Path>) -> AppResult<String> {
    if let Some(path) = path {
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AppError::io("event.read", Some(path.to_path_buf()), source));
    }
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .map_err(|source| AppError::io("event.read_stdin", None, source))?;
    Ok(raw)
}

/// Parse the event envelope. Resource properties stay raw so the handler can
/// report a malformed request to the caller instead of exiting silently.
fn parse_event(raw: &str) -> AppResult<LifecycleEvent> {
    serde_json::from_str(raw).map_err(|source| AppError::Event { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_deploy::{ReportDelivery, StaticStoreResolver};
    use skylift_test_support::mocks::ScriptedTransport;
    use std::collections::HashMap;

    const DELETE_EVENT: &str = r#"{
        "RequestType": "Delete",
        "ResponseURL": "http://callback.invalid/put",
        "StackId": "stack",
        "RequestId": "req-9",
        "LogicalResourceId": "Assets",
        "PhysicalResourceId": "assets-1",
        "ResourceProperties": { "ServiceToken": "arn", "actions": [] }
    }"#;

    #[tokio::test]
    async fn event_is_read_from_configured_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("event.json");
        std::fs::write(&path, DELETE_EVENT)?;
        let raw = read_event_source(Some(&path)).await?;
        let event = parse_event(&raw)?;
        assert_eq!(event.request_id, "req-9");
        assert_eq!(event.physical_resource_id.as_deref(), Some("assets-1"));

        let missing = read_event_source(Some(&temp.path().join("absent.json"))).await;
        assert!(matches!(missing, Err(AppError::Io { path: Some(_), .. })));
        Ok(())
    }

    #[test]
    fn malformed_event_is_rejected() {
        assert!(matches!(
            parse_event("{\"RequestType\":\"Replace\"}"),
            Err(AppError::Event { .. })
        ));
    }

    #[tokio::test]
    async fn run_app_with_answers_delete_requests() -> anyhow::Result<()> {
        let config = DeployConfig::from_lookup(|name| {
            HashMap::from([("SKYLIFT_LOG_STREAM_NAME", "stream-7")])
                .get(name)
                .map(|value| (*value).to_string())
        })?;
        let transport = Arc::new(ScriptedTransport::accepting());
        let dependencies = BootstrapDependencies {
            config,
            event: parse_event(DELETE_EVENT)?,
            stores: Arc::new(StaticStoreResolver::new()),
            transport: transport.clone(),
            metrics: Metrics::new()?,
        };

        let report = run_app_with(dependencies).await?;
        assert_eq!(report.report, ReportDelivery::Final { delivered: true });
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let body = calls[0].json()?;
        assert_eq!(body["PhysicalResourceId"], "assets-1");
        assert_eq!(body["RequestId"], "req-9");
        Ok(())
    }

    #[tokio::test]
    async fn delete_with_unparseable_actions_is_still_answered() -> anyhow::Result<()> {
        let raw = r#"{
            "RequestType": "Delete",
            "ResponseURL": "http://callback.invalid/put",
            "StackId": "stack",
            "RequestId": "req-10",
            "LogicalResourceId": "Assets",
            "ResourceProperties": { "actions": [{ "type": "prune-s3", "bucket": "x" }] }
        }"#;
        let config = DeployConfig::from_lookup(|_| None)?;
        let transport = Arc::new(ScriptedTransport::accepting());
        let dependencies = BootstrapDependencies {
            config,
            event: parse_event(raw)?,
            stores: Arc::new(StaticStoreResolver::new()),
            transport: transport.clone(),
            metrics: Metrics::new()?,
        };

        let report = run_app_with(dependencies).await?;
        assert_eq!(report.report, ReportDelivery::Final { delivered: true });
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].json()?["Status"], "SUCCESS");
        Ok(())
    }
}
