//! Filesystem trees and invocation fixtures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use skylift_deploy::{DeploymentRequest, InvocationContext, LifecycleEvent, RequestType};
use serde_json::Value;
use tempfile::TempDir;

/// Callback URL placed in fixture events.
pub const CALLBACK_URL: &str = "http://callback.invalid/response";
/// Log stream name placed in fixture contexts.
pub const LOG_STREAM: &str = "skylift/test-stream";

/// Fresh temporary directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("skylift-").tempdir()?)
}

/// Write `files` (relative path, contents) under `root`, creating parents.
///
/// # Errors
///
/// Returns an error if any directory or file cannot be written.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) -> Result<()> {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
    }
    Ok(())
}

/// Write `count` files named `{stem}-{n}.{extension}` into `root/dir`.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn write_numbered(
    root: &Path,
    dir: &str,
    stem: &str,
    extension: &str,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let target = root.join(dir);
    fs::create_dir_all(&target)?;
    (0..count)
        .map(|n| {
            let path = target.join(format!("{stem}-{n}.{extension}"));
            fs::write(&path, format!("{stem} {n}"))?;
            Ok(path)
        })
        .collect()
}

/// Lifecycle event addressed to [`CALLBACK_URL`] carrying `request`.
///
/// # Errors
///
/// Returns an error if the request cannot be serialised.
pub fn event(request_type: RequestType, request: &DeploymentRequest) -> Result<LifecycleEvent> {
    Ok(raw_event(request_type, serde_json::to_value(request)?))
}

/// Lifecycle event addressed to [`CALLBACK_URL`] with verbatim resource properties.
#[must_use]
pub fn raw_event(request_type: RequestType, properties: Value) -> LifecycleEvent {
    LifecycleEvent {
        request_type,
        resource_properties: properties,
        response_url: CALLBACK_URL.to_string(),
        stack_id: "arn:stack/skylift-test".to_string(),
        request_id: "request-1".to_string(),
        logical_resource_id: "SiteAssets".to_string(),
        physical_resource_id: None,
    }
}

/// Invocation context with `remaining` time on the [`LOG_STREAM`] stream.
#[must_use]
pub fn context(remaining: Duration) -> InvocationContext {
    InvocationContext {
        remaining_time: remaining,
        log_stream_name: LOG_STREAM.to_string(),
    }
}
