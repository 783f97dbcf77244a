//! Per-action work and the completeness gate.
//!
//! # Design
//! - Copy and Upload verify counts strictly; any mismatch is fatal.
//! - Prune is best-effort: listing and delete failures are logged, never raised.
//!   An incomplete keep set deletes nothing.
//! - Blocking filesystem work runs on the blocking pool.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use skylift_telemetry::{Metrics, debug_payload};
use tokio::task;
use tracing::{Level, debug, error, info, warn};
use walkdir::WalkDir;

use crate::batch::{batch_size, is_priority_asset, plan, plan_with_size};
use crate::enumerate::enumerate_files_blocking;
use crate::error::{DeployError, DeployResult};
use crate::model::{Action, ActionKind};
use crate::patch::{ContentPatch, PatchState};
use crate::store::{BlobStore, ObjectPath, StoreResolver, object_key, parse_key};
use crate::transfer::{ProgressTracker, TransferTally, run_batch};

/// Files larger than this are streamed with a multipart upload.
const STREAMING_THRESHOLD: u64 = 16 * 1024 * 1024;

/// What an action accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReport {
    /// The action had nothing to do.
    Skipped {
        /// Why the action was skipped.
        reason: &'static str,
    },
    /// Files copied and verified.
    Copied {
        /// Files present in both trees.
        files: usize,
    },
    /// Objects uploaded and verified.
    Uploaded {
        /// Upload outcome counts.
        tally: TransferTally,
    },
    /// Stale objects deleted.
    Pruned {
        /// Delete outcome counts.
        tally: TransferTally,
    },
}

impl ActionReport {
    const fn outcome(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            _ => "completed",
        }
    }
}

/// Executes one action at a time against the filesystem and object stores.
pub struct ActionExecutor {
    stores: Arc<dyn StoreResolver>,
    metrics: Metrics,
    patch: PatchState,
}

impl ActionExecutor {
    /// Executor without a content patch.
    #[must_use]
    pub fn new(stores: Arc<dyn StoreResolver>, metrics: Metrics) -> Self {
        Self {
            stores,
            metrics,
            patch: PatchState::Disabled,
        }
    }

    /// Use `patch` for every upload this executor runs.
    #[must_use]
    pub fn with_patch(mut self, patch: PatchState) -> Self {
        self.patch = patch;
        self
    }

    /// Execute `action` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the action fails fatally: a completeness mismatch,
    /// an unknown bucket, an unavailable content patch, or a failed bulk copy.
    pub async fn execute(&self, action: &Action) -> DeployResult<ActionReport> {
        let result = match action {
            Action::Copy {
                source_path,
                destination_path,
            } => self.copy(source_path, destination_path).await,
            Action::Upload {
                source_path,
                destination_bucket,
                key_prefix,
            } => {
                self.upload(source_path, destination_bucket, key_prefix.as_deref())
                    .await
            }
            Action::Prune {
                bucket,
                key_prefix,
                keep_keys,
                keep_source,
            } => {
                self.prune(
                    bucket,
                    key_prefix.as_deref(),
                    keep_keys,
                    keep_source.as_deref(),
                )
                .await
            }
        };
        let outcome = result.as_ref().map_or("failed", ActionReport::outcome);
        self.metrics.inc_action(action.kind().as_str(), outcome);
        result
    }

    async fn copy(&self, source: &Path, destination: &Path) -> DeployResult<ActionReport> {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "copying files"
        );
        if !source.exists() {
            warn!(source = %source.display(), "source directory does not exist, skipping copy");
            return Ok(ActionReport::Skipped {
                reason: "source_missing",
            });
        }
        let source_listing = enumerate_files_blocking(source).await?;
        source_listing.log_errors("copy.enumerate_source");
        if source_listing.is_empty() {
            warn!(source = %source.display(), "source directory is empty, skipping copy");
            return Ok(ActionReport::Skipped {
                reason: "source_empty",
            });
        }

        let (from, to) = (source.to_path_buf(), destination.to_path_buf());
        let failures = task::spawn_blocking(move || copy_tree(&from, &to))
            .await
            .map_err(|source| DeployError::join("copy.copy_tree", source))??;
        for err in &failures {
            warn!(error = %err.report_reason(), "file not copied");
        }

        let destination_listing = enumerate_files_blocking(destination).await?;
        destination_listing.log_errors("copy.enumerate_destination");
        verify_counts(
            ActionKind::Copy,
            source_listing.len(),
            destination_listing.len(),
        )?;
        Ok(ActionReport::Copied {
            files: destination_listing.len(),
        })
    }

    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        key_prefix: Option<&str>,
    ) -> DeployResult<ActionReport> {
        info!(
            source = %source.display(),
            bucket,
            prefix = key_prefix.unwrap_or_default(),
            "uploading files"
        );
        let store = self.stores.resolve(bucket)?;
        let patch = self.patch.for_upload()?;
        let listing = enumerate_files_blocking(source).await?;
        listing.log_errors("upload.enumerate");
        let total = listing.len();
        if total == 0 {
            info!(source = %source.display(), "no files to upload");
            return Ok(ActionReport::Uploaded {
                tally: TransferTally::default(),
            });
        }
        let size = batch_size(total);
        info!(files = total, batch_size = size, "planning upload batches");

        let is_priority: &dyn Fn(&PathBuf) -> bool =
            &|path: &PathBuf| path.strip_prefix(source).is_ok_and(is_priority_asset);
        let mut progress = ProgressTracker::new(total);
        let mut tally = TransferTally::default();
        for batch in plan_with_size(listing.files, size, Some(is_priority)) {
            debug!(
                files = batch.len(),
                high_priority = batch.high_priority,
                "uploading batch"
            );
            if tracing::enabled!(Level::DEBUG) {
                let descriptors = upload_descriptors(bucket, source, key_prefix, &batch.items);
                debug_payload("upload.batch", &descriptors);
            }
            let batch_tally = run_batch(&batch, |path| {
                upload_file(store.as_ref(), source, key_prefix, patch, path)
            })
            .await;
            progress.update(batch.len());
            tally.merge(batch_tally);
        }
        progress.log_progress();

        self.metrics.add_objects("upload", "succeeded", tally.succeeded);
        self.metrics.add_objects("upload", "failed", tally.failed);
        info!(
            bucket,
            uploaded = tally.succeeded,
            failed = tally.failed,
            "upload finished"
        );
        verify_counts(ActionKind::Upload, total, tally.succeeded)?;
        Ok(ActionReport::Uploaded { tally })
    }

    async fn prune(
        &self,
        bucket: &str,
        key_prefix: Option<&str>,
        keep_keys: &[String],
        keep_source: Option<&Path>,
    ) -> DeployResult<ActionReport> {
        info!(
            bucket,
            prefix = key_prefix.unwrap_or_default(),
            "pruning stale objects"
        );
        let store = self.stores.resolve(bucket)?;
        let prefix = key_prefix.map(parse_key).transpose()?;
        let Some(keep) = keep_set(key_prefix, keep_keys, keep_source).await? else {
            warn!(bucket, "keep source not fully readable, nothing pruned");
            return Ok(ActionReport::Pruned {
                tally: TransferTally::default(),
            });
        };

        let listed = match store.list_keys(prefix.as_ref()).await {
            Ok(listed) => listed,
            Err(err) => {
                warn!(bucket, error = %err.report_reason(), "listing failed, nothing pruned");
                return Ok(ActionReport::Pruned {
                    tally: TransferTally::default(),
                });
            }
        };
        let listed_count = listed.len();
        let stale: Vec<ObjectPath> = listed
            .into_iter()
            .filter(|key| !keep.contains(key.as_ref()))
            .collect();
        let stale_keys: Vec<&str> = stale.iter().map(AsRef::as_ref).collect();
        debug_payload("prune.stale_keys", &stale_keys);
        info!(
            bucket,
            listed = listed_count,
            stale = stale.len(),
            "deleting stale objects"
        );

        let mut progress = ProgressTracker::new(stale.len());
        let mut tally = TransferTally::default();
        for batch in plan(stale, None) {
            let batch_tally = run_batch(&batch, |key| store.delete_object(key)).await;
            progress.update(batch.len());
            tally.merge(batch_tally);
        }
        progress.log_progress();

        self.metrics.add_objects("delete", "succeeded", tally.succeeded);
        self.metrics.add_objects("delete", "failed", tally.failed);
        if tally.failed > 0 {
            warn!(bucket, failed = tally.failed, "some stale objects were not deleted");
        }
        Ok(ActionReport::Pruned { tally })
    }
}

/// Require `expected == actual` for `action`.
///
/// # Errors
///
/// Returns [`DeployError::CompletenessMismatch`] when the counts differ.
pub fn verify_counts(action: ActionKind, expected: usize, actual: usize) -> DeployResult<()> {
    if expected == actual {
        info!(action = action.as_str(), files = actual, "file counts verified");
        return Ok(());
    }
    error!(
        action = action.as_str(),
        expected, actual, "file count mismatch"
    );
    Err(DeployError::CompletenessMismatch {
        action: action.as_str(),
        expected,
        actual,
    })
}

async fn upload_file(
    store: &dyn BlobStore,
    source_root: &Path,
    key_prefix: Option<&str>,
    patch: Option<&ContentPatch>,
    path: &Path,
) -> DeployResult<()> {
    let relative = path
        .strip_prefix(source_root)
        .map_err(|_| DeployError::InvalidInput {
            field: "source_path",
            reason: "strip_prefix",
            value: Some(path.to_string_lossy().into_owned()),
        })?;
    let key = object_key(key_prefix, relative)?;
    let content_type = mime_guess::from_path(path).first_raw();
    let patch = patch.filter(|patch| patch.applies_to(path));
    if patch.is_none() {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|source| DeployError::io("upload.stat", path, source))?
            .len();
        if size > STREAMING_THRESHOLD {
            debug!(key = %key, size, "streaming large file");
            return store.put_file(&key, path, content_type).await;
        }
    }
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| DeployError::io("upload.read", path, source))?;
    let body = match patch {
        Some(patch) => {
            info!(key = %key, "applying content patch");
            patch.apply(&raw)
        }
        None => Bytes::from(raw),
    };
    store.put_object(&key, body, content_type).await
}

/// Keys that must survive a prune, or `None` when the keep source could not
/// be listed completely.
async fn keep_set(
    key_prefix: Option<&str>,
    keep_keys: &[String],
    keep_source: Option<&Path>,
) -> DeployResult<Option<HashSet<String>>> {
    let mut keep: HashSet<String> = keep_keys
        .iter()
        .filter_map(|key| parse_key(key).ok())
        .map(|key| key.as_ref().to_string())
        .collect();
    if let Some(root) = keep_source {
        if !root.is_dir() {
            warn!(source = %root.display(), "keep source directory does not exist");
            return Ok(None);
        }
        let listing = enumerate_files_blocking(root).await?;
        if !listing.errors.is_empty() {
            listing.log_errors("prune.enumerate_keep_source");
            return Ok(None);
        }
        for path in &listing.files {
            if let Ok(relative) = path.strip_prefix(root) {
                keep.insert(object_key(key_prefix, relative)?.as_ref().to_string());
            }
        }
    }
    Ok(Some(keep))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadDescriptor<'a> {
    bucket: &'a str,
    key: String,
    content_type: Option<&'static str>,
}

fn upload_descriptors<'a>(
    bucket: &'a str,
    source_root: &Path,
    key_prefix: Option<&str>,
    paths: &[PathBuf],
) -> Vec<UploadDescriptor<'a>> {
    paths
        .iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(source_root).ok()?;
            let key = object_key(key_prefix, relative).ok()?;
            Some(UploadDescriptor {
                bucket,
                key: key.as_ref().to_string(),
                content_type: mime_guess::from_path(path).first_raw(),
            })
        })
        .collect()
}

/// Copy every file under `source` into `destination`.
///
/// Only creating `destination` itself is fatal. Entries that cannot be read or
/// written are returned so the count check reports them as missing.
fn copy_tree(source: &Path, destination: &Path) -> DeployResult<Vec<DeployError>> {
    fs::create_dir_all(destination)
        .map_err(|source_err| DeployError::io("copy_tree.create_dir", destination, source_err))?;

    let mut failures = Vec::new();
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map_or_else(|| source.to_path_buf(), Path::to_path_buf);
                failures.push(DeployError::walkdir("copy_tree.walk", path, err));
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let copied = if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| DeployError::io("copy_tree.create_dir", &target, err))
        } else {
            copy_entry(entry.path(), &target)
        };
        if let Err(err) = copied {
            failures.push(err);
        }
    }
    Ok(failures)
}

fn copy_entry(from: &Path, target: &Path) -> DeployResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| DeployError::io("copy_tree.create_parent", parent, err))?;
    }
    fs::copy(from, target)
        .map(|_| ())
        .map_err(|err| DeployError::io("copy_tree.copy_entry", target, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ObjectStoreBlobs, StaticStoreResolver};
    use object_store::ObjectStore;
    use object_store::memory::InMemory;

    fn executor(bucket: &str) -> anyhow::Result<(ActionExecutor, Arc<ObjectStoreBlobs>)> {
        let blobs = Arc::new(ObjectStoreBlobs::new(Arc::new(InMemory::new())));
        let resolver = StaticStoreResolver::new().with_store(bucket, blobs.clone());
        Ok((ActionExecutor::new(Arc::new(resolver), Metrics::new()?), blobs))
    }

    fn write(root: &Path, relative: &str, body: &str) -> anyhow::Result<()> {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, body)?;
        Ok(())
    }

    #[test]
    fn verify_counts_rejects_mismatch() {
        assert!(verify_counts(ActionKind::Upload, 3, 3).is_ok());
        assert!(matches!(
            verify_counts(ActionKind::Copy, 5, 4),
            Err(DeployError::CompletenessMismatch {
                action: "fs-to-fs",
                expected: 5,
                actual: 4,
            })
        ));
    }

    #[tokio::test]
    async fn copy_skips_missing_and_empty_sources() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (executor, _) = executor("site")?;
        fs::create_dir_all(temp.path().join("empty"))?;

        let missing = Action::Copy {
            source_path: temp.path().join("absent"),
            destination_path: temp.path().join("out"),
        };
        assert_eq!(
            executor.execute(&missing).await?,
            ActionReport::Skipped {
                reason: "source_missing"
            }
        );
        let empty = Action::Copy {
            source_path: temp.path().join("empty"),
            destination_path: temp.path().join("out"),
        };
        assert_eq!(
            executor.execute(&empty).await?,
            ActionReport::Skipped {
                reason: "source_empty"
            }
        );
        assert!(!temp.path().join("out").exists());
        Ok(())
    }

    #[tokio::test]
    async fn copy_replicates_tree_and_verifies() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        write(&source, "a.txt", "a")?;
        write(&source, "nested/b.txt", "b")?;
        let destination = temp.path().join("deep/out");
        let (executor, _) = executor("site")?;

        let report = executor
            .execute(&Action::Copy {
                source_path: source,
                destination_path: destination.clone(),
            })
            .await?;
        assert_eq!(report, ActionReport::Copied { files: 2 });
        assert_eq!(fs::read_to_string(destination.join("nested/b.txt"))?, "b");
        Ok(())
    }

    #[tokio::test]
    async fn copy_into_populated_destination_fails_the_count() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        let destination = temp.path().join("dst");
        write(&source, "a.txt", "a")?;
        write(&destination, "stale.txt", "old")?;
        let (executor, _) = executor("site")?;

        let result = executor
            .execute(&Action::Copy {
                source_path: source,
                destination_path: destination,
            })
            .await;
        assert!(matches!(
            result,
            Err(DeployError::CompletenessMismatch {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn upload_writes_prefixed_keys_with_content_types() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(temp.path(), "index.html", "<html/>")?;
        write(temp.path(), "_next/static/app.js", "js")?;
        let (executor, blobs) = executor("site")?;

        let report = executor
            .execute(&Action::Upload {
                source_path: temp.path().to_path_buf(),
                destination_bucket: "site".to_string(),
                key_prefix: Some("v1/".to_string()),
            })
            .await?;
        assert!(matches!(
            report,
            ActionReport::Uploaded {
                tally: TransferTally {
                    attempted: 2,
                    succeeded: 2,
                    failed: 0
                }
            }
        ));

        let stored = blobs.inner().get(&parse_key("v1/index.html")?).await?;
        let content_type: Option<&str> = stored
            .attributes
            .get(&object_store::Attribute::ContentType)
            .map(AsRef::as_ref);
        assert_eq!(content_type, Some("text/html"));
        assert!(blobs.inner().head(&parse_key("v1/_next/static/app.js")?).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn upload_to_unknown_bucket_is_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(temp.path(), "index.html", "x")?;
        let (executor, _) = executor("site")?;
        let result = executor
            .execute(&Action::Upload {
                source_path: temp.path().to_path_buf(),
                destination_bucket: "other".to_string(),
                key_prefix: None,
            })
            .await;
        assert!(matches!(result, Err(DeployError::UnknownBucket { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn upload_applies_patch_to_entry_chunk_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(temp.path(), ".next/static/chunks/main-app-1.js", "body")?;
        write(temp.path(), ".next/static/chunks/other.js", "plain")?;
        let (executor, blobs) = executor("site")?;
        let executor = executor.with_patch(PatchState::Ready(ContentPatch::new(
            crate::patch::DEFAULT_MARKER,
            "\"use strict\";setup();",
            crate::patch::DEFAULT_DIRECTIVE,
        )));

        executor
            .execute(&Action::Upload {
                source_path: temp.path().to_path_buf(),
                destination_bucket: "site".to_string(),
                key_prefix: None,
            })
            .await?;
        let patched = blobs
            .inner()
            .get(&parse_key(".next/static/chunks/main-app-1.js")?)
            .await?
            .bytes()
            .await?;
        assert_eq!(patched.as_ref(), b"setup();\nbody".as_slice());
        let plain = blobs
            .inner()
            .get(&parse_key(".next/static/chunks/other.js")?)
            .await?
            .bytes()
            .await?;
        assert_eq!(plain.as_ref(), b"plain".as_slice());
        Ok(())
    }

    #[tokio::test]
    async fn upload_fails_when_required_patch_is_missing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(temp.path(), "index.html", "x")?;
        let (executor, _) = executor("site")?;
        let executor = executor.with_patch(PatchState::Unavailable { path: None });
        let result = executor
            .execute(&Action::Upload {
                source_path: temp.path().to_path_buf(),
                destination_bucket: "site".to_string(),
                key_prefix: None,
            })
            .await;
        assert!(matches!(result, Err(DeployError::PatchUnavailable { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn prune_deletes_everything_outside_the_keep_set() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(temp.path(), "current.js", "js")?;
        let (executor, blobs) = executor("site")?;
        for key in ["v1/current.js", "v1/old.js", "v1/keep.txt", "v2/other.js"] {
            blobs
                .put_object(&parse_key(key)?, Bytes::from_static(b"x"), None)
                .await?;
        }

        let report = executor
            .execute(&Action::Prune {
                bucket: "site".to_string(),
                key_prefix: Some("v1".to_string()),
                keep_keys: vec!["v1/keep.txt".to_string()],
                keep_source: Some(temp.path().to_path_buf()),
            })
            .await?;
        assert!(matches!(
            report,
            ActionReport::Pruned {
                tally: TransferTally { succeeded: 1, failed: 0, .. }
            }
        ));

        let mut remaining: Vec<String> = blobs
            .list_keys(None)
            .await?
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["v1/current.js", "v1/keep.txt", "v2/other.js"]);
        Ok(())
    }

    #[tokio::test]
    async fn copy_counts_unwritable_entries_as_missing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        let destination = temp.path().join("dst");
        for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
            write(&source, name, name)?;
        }
        // A directory squatting on a file name cannot be overwritten by a copy.
        fs::create_dir_all(destination.join("e.txt"))?;
        let (executor, _) = executor("site")?;

        let result = executor
            .execute(&Action::Copy {
                source_path: source,
                destination_path: destination.clone(),
            })
            .await;
        let Err(err) = result else {
            anyhow::bail!("copy with a blocked entry must fail verification");
        };
        assert_eq!(
            err.report_reason(),
            "file count mismatch after fs-to-fs: source 5, transferred 4, missing 1"
        );
        assert_eq!(fs::read_to_string(destination.join("d.txt"))?, "d.txt");
        Ok(())
    }

    #[tokio::test]
    async fn prune_with_missing_keep_source_deletes_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (executor, blobs) = executor("site")?;
        for key in ["v1/index.html", "v1/app.js"] {
            blobs
                .put_object(&parse_key(key)?, Bytes::from_static(b"x"), None)
                .await?;
        }

        let report = executor
            .execute(&Action::Prune {
                bucket: "site".to_string(),
                key_prefix: Some("v1".to_string()),
                keep_keys: Vec::new(),
                keep_source: Some(temp.path().join("typo")),
            })
            .await?;
        assert_eq!(
            report,
            ActionReport::Pruned {
                tally: TransferTally::default()
            }
        );
        assert_eq!(blobs.list_keys(None).await?.len(), 2);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn prune_with_unreadable_keep_subtree_deletes_nothing() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        write(temp.path(), "index.html", "x")?;
        write(temp.path(), "assets/app.js", "x")?;
        let locked = temp.path().join("assets");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;
        if fs::read_dir(&locked).is_ok() {
            // Privileged runs read through the mode bits; nothing to observe.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;
            return Ok(());
        }

        let (executor, blobs) = executor("site")?;
        for key in ["v1/index.html", "v1/assets/app.js"] {
            blobs
                .put_object(&parse_key(key)?, Bytes::from_static(b"x"), None)
                .await?;
        }
        let report = executor
            .execute(&Action::Prune {
                bucket: "site".to_string(),
                key_prefix: Some("v1".to_string()),
                keep_keys: Vec::new(),
                keep_source: Some(temp.path().to_path_buf()),
            })
            .await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        assert_eq!(
            report?,
            ActionReport::Pruned {
                tally: TransferTally::default()
            }
        );
        assert_eq!(blobs.list_keys(None).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn upload_streams_files_above_the_threshold() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let size = usize::try_from(STREAMING_THRESHOLD)? + 1;
        fs::write(temp.path().join("video.mp4"), vec![7_u8; size])?;
        write(temp.path(), "index.html", "<html/>")?;
        let (executor, blobs) = executor("site")?;

        executor
            .execute(&Action::Upload {
                source_path: temp.path().to_path_buf(),
                destination_bucket: "site".to_string(),
                key_prefix: None,
            })
            .await?;
        let stored = blobs
            .inner()
            .get(&parse_key("video.mp4")?)
            .await?
            .bytes()
            .await?;
        assert_eq!(stored.len(), size);
        assert!(stored.iter().all(|byte| *byte == 7));
        Ok(())
    }

    #[test]
    fn upload_descriptors_name_bucket_key_and_type() -> anyhow::Result<()> {
        let root = Path::new("/build/out");
        let descriptors = upload_descriptors(
            "site",
            root,
            Some("v1"),
            &[root.join("index.html"), PathBuf::from("/elsewhere/x.js")],
        );
        let rendered = serde_json::to_value(&descriptors)?;
        assert_eq!(
            rendered,
            serde_json::json!([
                { "bucket": "site", "key": "v1/index.html", "contentType": "text/html" }
            ])
        );
        Ok(())
    }
}
