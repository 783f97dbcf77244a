use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use skylift_deploy::{
    Action, BlobStore, DeploymentRequest, HandlerSettings, InvocationHandler, InvocationReport,
    PipelineOutcome, PipelineState, ReportDelivery, RequestType, StaticStoreResolver,
};
use skylift_telemetry::Metrics;
use skylift_test_support::fixtures::{context, event, temp_dir, write_numbered, write_tree};
use skylift_test_support::mocks::{FlakyBlobStore, RecordedCall, ScriptedTransport};
use tokio::time::Instant;

const BUCKET: &str = "site-assets";

fn upload(source: &Path) -> Action {
    Action::Upload {
        source_path: source.to_path_buf(),
        destination_bucket: BUCKET.to_string(),
        key_prefix: None,
    }
}

async fn run(
    store: FlakyBlobStore,
    check_interval: Duration,
    remaining: Duration,
    actions: Vec<Action>,
) -> anyhow::Result<(InvocationReport, Vec<RecordedCall>, Arc<FlakyBlobStore>)> {
    let store = Arc::new(store);
    let blobs: Arc<dyn BlobStore> = store.clone();
    let transport = Arc::new(ScriptedTransport::accepting());
    let handler = InvocationHandler::new(
        Arc::new(StaticStoreResolver::new().with_store(BUCKET, blobs)),
        transport.clone(),
        Metrics::new()?,
        HandlerSettings {
            check_interval,
            ..HandlerSettings::default()
        },
    );
    let request = DeploymentRequest {
        actions,
        ..DeploymentRequest::default()
    };
    let report = handler
        .handle(event(RequestType::Create, &request)?, context(remaining))
        .await;
    Ok((report, transport.calls(), store))
}

#[tokio::test(start_paused = true)]
async fn deadline_after_first_action_reports_partial_completion() -> anyhow::Result<()> {
    let temp = temp_dir()?;
    write_tree(
        temp.path(),
        &[("one/index.html", "1"), ("two/a.css", "2"), ("three/b.js", "3")],
    )?;
    let actions = vec![
        upload(&temp.path().join("one")),
        upload(&temp.path().join("two")),
        upload(&temp.path().join("three")),
    ];

    // Deadline lands at 10s; the first upload takes 15s and the monitor only
    // checks after 60s, so the pipeline observes the deadline first.
    let (report, calls, store) = run(
        FlakyBlobStore::new().with_put_delay(Duration::from_secs(15)),
        Duration::from_secs(60),
        Duration::from_secs(30),
        actions,
    )
    .await?;

    assert_eq!(
        report.state,
        PipelineState::Finished(PipelineOutcome::PartialCompleted {
            completed: 1,
            total: 3,
        })
    );
    assert_eq!(report.report, ReportDelivery::Final { delivered: true });
    assert_eq!(store.keys().await?, vec!["index.html"]);

    assert_eq!(calls.len(), 1);
    let body = calls[0].json()?;
    assert_eq!(body["Status"], "SUCCESS");
    assert_eq!(
        body["Reason"],
        "Execution approaching timeout after completing 1/3 actions."
    );
    assert_eq!(body["Data"]["partialExecution"], "true");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn early_report_wins_while_an_action_is_in_flight() -> anyhow::Result<()> {
    let temp = temp_dir()?;
    write_tree(temp.path(), &[("one/index.html", "1"), ("two/a.css", "2")])?;
    let actions = vec![
        upload(&temp.path().join("one")),
        upload(&temp.path().join("two")),
    ];

    let (report, calls, store) = run(
        FlakyBlobStore::new().with_put_delay(Duration::from_secs(15)),
        Duration::from_secs(5),
        Duration::from_secs(30),
        actions,
    )
    .await?;

    assert_eq!(report.report, ReportDelivery::EarlyReport);
    assert!(matches!(
        report.state,
        PipelineState::Finished(PipelineOutcome::PartialCompleted { completed: 1, .. })
    ));
    // The in-flight action still ran to completion.
    assert_eq!(store.keys().await?, vec!["index.html"]);

    assert_eq!(calls.len(), 1);
    let body = calls[0].json()?;
    assert_eq!(body["Status"], "SUCCESS");
    assert_eq!(
        body["Reason"],
        "Execution approaching deadline, reporting partial success"
    );
    assert_eq!(body["Data"]["previewModeId"], "");
    assert_eq!(body["Data"]["partialExecution"], "true");
    assert_eq!(
        body["Data"]["message"],
        "Operation timed out but some assets were deployed successfully"
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exactly_one_report_for_any_action_duration() -> anyhow::Result<()> {
    for delay_secs in [0_u64, 4, 9, 10, 11, 14, 16, 30] {
        let temp = temp_dir()?;
        write_tree(temp.path(), &[("a/index.html", "a"), ("b/site.css", "b")])?;
        let actions = vec![upload(&temp.path().join("a")), upload(&temp.path().join("b"))];
        let (report, calls, _) = run(
            FlakyBlobStore::new().with_put_delay(Duration::from_secs(delay_secs)),
            Duration::from_secs(5),
            Duration::from_secs(30),
            actions,
        )
        .await?;

        assert_eq!(calls.len(), 1, "delay {delay_secs}s sent {} reports", calls.len());
        let reason = calls[0].json()?["Reason"].clone();
        match report.report {
            ReportDelivery::EarlyReport => assert_eq!(
                reason,
                "Execution approaching deadline, reporting partial success"
            ),
            ReportDelivery::Final { delivered } => {
                assert!(delivered);
                assert_ne!(
                    reason,
                    "Execution approaching deadline, reporting partial success"
                );
            }
        }
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expired_budget_runs_no_actions() -> anyhow::Result<()> {
    let temp = temp_dir()?;
    write_tree(temp.path(), &[("index.html", "x")])?;
    let (report, calls, store) = run(
        FlakyBlobStore::new(),
        Duration::from_secs(5),
        Duration::from_secs(10),
        vec![upload(temp.path())],
    )
    .await?;

    assert_eq!(
        report.state,
        PipelineState::Finished(PipelineOutcome::PartialCompleted {
            completed: 0,
            total: 1,
        })
    );
    assert_eq!(store.put_count(), 0);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].json()?["Reason"],
        "Execution approaching timeout after completing 0/1 actions."
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn large_upload_runs_priority_batch_first_in_batches_of_fifty() -> anyhow::Result<()> {
    let temp = temp_dir()?;
    write_numbered(temp.path(), "media", "img", "png", 1180)?;
    write_numbered(temp.path(), "pages", "route", "html", 20)?;

    let started = Instant::now();
    let (report, calls, store) = run(
        FlakyBlobStore::new().with_put_delay(Duration::from_secs(1)),
        Duration::from_secs(5),
        Duration::from_secs(900),
        vec![upload(temp.path())],
    )
    .await?;
    let elapsed = started.elapsed();

    assert_eq!(
        report.state,
        PipelineState::Finished(PipelineOutcome::Completed { total: 1 })
    );
    assert_eq!(calls.len(), 1);

    let order = store.put_order();
    assert_eq!(order.len(), 1200);
    assert!(order[..20].iter().all(|key| key.ends_with(".html")));
    assert!(order[20..].iter().all(|key| key.ends_with(".png")));

    // One priority batch of 20, then ceil(1180 / 50) = 24 regular batches,
    // each costing one second of store latency.
    assert!(elapsed >= Duration::from_secs(25), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(27), "elapsed {elapsed:?}");
    Ok(())
}
