//! Content rewrite for the client entry chunk of globally distributed function deployments.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{DeployError, DeployResult};

/// File-name marker of the chunk that receives the patch.
pub const DEFAULT_MARKER: &str = ".next/static/chunks/main-app-";
/// Directive removed from the patch script before it is prepended.
pub const DEFAULT_DIRECTIVE: &str = "\"use strict\";";

/// Prepends a script to one specific bundle file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPatch {
    marker: String,
    script: String,
}

impl ContentPatch {
    /// Build a patch, removing the first occurrence of `directive` from `script`.
    #[must_use]
    pub fn new(marker: impl Into<String>, script: &str, directive: &str) -> Self {
        let script = if directive.is_empty() {
            script.to_string()
        } else {
            script.replacen(directive, "", 1)
        };
        Self {
            marker: marker.into(),
            script,
        }
    }

    /// Load the script from disk using the default marker and directive.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be read as UTF-8 text.
    pub fn load(script_path: &Path) -> DeployResult<Self> {
        let script = fs::read_to_string(script_path)
            .map_err(|source| DeployError::io("patch.load", script_path, source))?;
        Ok(Self::new(DEFAULT_MARKER, &script, DEFAULT_DIRECTIVE))
    }

    /// Whether `path` is the chunk this patch targets.
    #[must_use]
    pub fn applies_to(&self, path: &Path) -> bool {
        path.to_string_lossy()
            .replace('\\', "/")
            .contains(&self.marker)
    }

    /// Patched body: the script, a newline, then the original bytes.
    #[must_use]
    pub fn apply(&self, body: &[u8]) -> Bytes {
        let mut patched = Vec::with_capacity(self.script.len() + 1 + body.len());
        patched.extend_from_slice(self.script.as_bytes());
        patched.push(b'\n');
        patched.extend_from_slice(body);
        Bytes::from(patched)
    }

    /// Script content after directive removal.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }
}

/// Whether and how uploads are patched during one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PatchState {
    /// The deployment mode does not patch content.
    #[default]
    Disabled,
    /// The patch is loaded and applies to matching files.
    Ready(ContentPatch),
    /// The deployment mode requires a patch that could not be loaded.
    Unavailable {
        /// Configured script location, if any.
        path: Option<PathBuf>,
    },
}

impl PatchState {
    /// Patch to use for uploads.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::PatchUnavailable`] when the mode requires a patch
    /// that could not be loaded.
    pub fn for_upload(&self) -> DeployResult<Option<&ContentPatch>> {
        match self {
            Self::Disabled => Ok(None),
            Self::Ready(patch) => Ok(Some(patch)),
            Self::Unavailable { path } => Err(DeployError::PatchUnavailable { path: path.clone() }),
        }
    }
}
