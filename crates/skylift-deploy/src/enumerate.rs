//! Recursive listing of regular files under a directory.

use std::path::{Path, PathBuf};

use tokio::task;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{DeployError, DeployResult};

/// Files discovered under a root, plus the entries that could not be read.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Regular files in traversal order (sorted by file name per directory).
    pub files: Vec<PathBuf>,
    /// Subtrees or entries that could not be read; their contents are omitted.
    pub errors: Vec<DeployError>,
}

impl Enumeration {
    /// Number of files discovered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files were discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Log every unreadable entry as a warning.
    pub fn log_errors(&self, operation: &'static str) {
        for err in &self.errors {
            warn!(operation, error = %err.report_reason(), "skipping unreadable entry");
        }
    }
}

/// Walk `root` and collect every non-directory entry.
///
/// A missing or unreadable root yields an empty listing with the failure
/// recorded in [`Enumeration::errors`].
#[must_use]
pub fn enumerate_files(root: &Path) -> Enumeration {
    let mut listing = Enumeration::default();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {}
            Ok(entry) => listing.files.push(entry.into_path()),
            Err(err) => {
                let path = err.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                listing
                    .errors
                    .push(DeployError::walkdir("enumerate.walk", path, err));
            }
        }
    }
    listing
}

/// Run [`enumerate_files`] on the blocking pool.
///
/// # Errors
///
/// Returns an error if the blocking task panics or is cancelled.
pub(crate) async fn enumerate_files_blocking(root: &Path) -> DeployResult<Enumeration> {
    let root = root.to_path_buf();
    task::spawn_blocking(move || enumerate_files(&root))
        .await
        .map_err(|source| DeployError::join("enumerate", source))
}
