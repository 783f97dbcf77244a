//! Post-run steps: image cache directory and preview-mode identifier.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{DeployError, DeployResult};

#[derive(Deserialize)]
struct PrerenderManifest {
    preview: PreviewSection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewSection {
    preview_mode_id: String,
}

/// Create the image cache directory if it is missing.
///
/// Returns whether the directory was created.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn init_cache_dir(path: &Path) -> DeployResult<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(path).map_err(|source| DeployError::io("cache.create_dir", path, source))?;
    info!(path = %path.display(), "created image cache directory");
    Ok(true)
}

/// Read `preview.previewModeId` from a prerender manifest.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or lacks the field.
pub fn read_preview_mode_id(manifest_path: &Path) -> DeployResult<String> {
    let raw = fs::read_to_string(manifest_path)
        .map_err(|source| DeployError::io("manifest.read", manifest_path, source))?;
    let manifest: PrerenderManifest = serde_json::from_str(&raw)
        .map_err(|source| DeployError::json("manifest.parse", manifest_path, source))?;
    Ok(manifest.preview.preview_mode_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_created_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cache = temp.path().join("cache/images");
        assert!(init_cache_dir(&cache)?);
        assert!(cache.is_dir());
        assert!(!init_cache_dir(&cache)?);
        Ok(())
    }

    #[test]
    fn preview_mode_id_is_read_from_manifest() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let manifest = temp.path().join("prerender-manifest.json");
        fs::write(
            &manifest,
            r#"{"version":4,"routes":{},"preview":{"previewModeId":"abc123","previewModeSigningKey":"k"}}"#,
        )?;
        assert_eq!(read_preview_mode_id(&manifest)?, "abc123");
        Ok(())
    }

    #[test]
    fn malformed_or_missing_manifest_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let manifest = temp.path().join("prerender-manifest.json");
        assert!(matches!(
            read_preview_mode_id(&manifest),
            Err(DeployError::Io { .. })
        ));
        fs::write(&manifest, r#"{"preview":{}}"#)?;
        assert!(matches!(
            read_preview_mode_id(&manifest),
            Err(DeployError::Json { .. })
        ));
        Ok(())
    }
}
