//! Invocation, request, and action types as they arrive on the wire.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DeployError, DeployResult};

/// A single deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Recursively copy a local directory into another local directory.
    #[serde(rename = "fs-to-fs", rename_all = "camelCase")]
    Copy {
        /// Directory to copy from.
        source_path: PathBuf,
        /// Directory to copy into; created when absent.
        destination_path: PathBuf,
    },
    /// Upload every file under a local directory to a bucket.
    #[serde(rename = "fs-to-s3", rename_all = "camelCase")]
    Upload {
        /// Directory to upload.
        source_path: PathBuf,
        /// Destination bucket.
        #[serde(rename = "destinationBucketName")]
        destination_bucket: String,
        /// Key prefix prepended to every relative path.
        #[serde(
            default,
            rename = "destinationKeyPrefix",
            skip_serializing_if = "Option::is_none"
        )]
        key_prefix: Option<String>,
    },
    /// Delete objects under a prefix that are not part of the keep set.
    #[serde(rename = "prune-s3", rename_all = "camelCase")]
    Prune {
        /// Bucket to prune.
        #[serde(rename = "bucketName")]
        bucket: String,
        /// Only keys under this prefix are considered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_prefix: Option<String>,
        /// Keys that must survive the prune.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keep_keys: Vec<String>,
        /// Local directory whose files (mapped through `key_prefix`) also survive.
        #[serde(default, rename = "sourcePath", skip_serializing_if = "Option::is_none")]
        keep_source: Option<PathBuf>,
    },
}

impl Action {
    /// Discriminant of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Copy { .. } => ActionKind::Copy,
            Self::Upload { .. } => ActionKind::Upload,
            Self::Prune { .. } => ActionKind::Prune,
        }
    }
}

/// Action discriminant, rendered with its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// `fs-to-fs`
    Copy,
    /// `fs-to-s3`
    Upload,
    /// `prune-s3`
    Prune,
}

impl ActionKind {
    /// Wire name of the action type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "fs-to-fs",
            Self::Upload => "fs-to-s3",
            Self::Prune => "prune-s3",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment topology of the site being published.
///
/// Only [`DeploymentMode::GlobalFunctions`] changes behaviour: it enables the
/// content patch for uploaded client chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentMode {
    /// `NextjsGlobalFunctions`
    GlobalFunctions,
    /// `NextjsGlobalContainers`
    GlobalContainers,
    /// `NextjsRegionalContainers`
    RegionalContainers,
    /// `NextjsRegionalFunctions`
    RegionalFunctions,
    /// Any other value, preserved verbatim.
    Other(String),
}

impl DeploymentMode {
    /// Whether uploads must run through the content patch.
    #[must_use]
    pub const fn requires_content_patch(&self) -> bool {
        matches!(self, Self::GlobalFunctions)
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::GlobalFunctions => "NextjsGlobalFunctions",
            Self::GlobalContainers => "NextjsGlobalContainers",
            Self::RegionalContainers => "NextjsRegionalContainers",
            Self::RegionalFunctions => "NextjsRegionalFunctions",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for DeploymentMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "NextjsGlobalFunctions" => Self::GlobalFunctions,
            "NextjsGlobalContainers" => Self::GlobalContainers,
            "NextjsRegionalContainers" => Self::RegionalContainers,
            "NextjsRegionalFunctions" => Self::RegionalFunctions,
            _ => Self::Other(value),
        }
    }
}

impl From<DeploymentMode> for String {
    fn from(mode: DeploymentMode) -> Self {
        match mode {
            DeploymentMode::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

/// Resource properties describing one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Ordered actions; executed strictly in sequence.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Directory to create after a successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_cache_path: Option<PathBuf>,
    /// Manifest carrying the preview-mode identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerender_manifest_path: Option<PathBuf>,
    /// Deployment topology.
    #[serde(default, alias = "nextjsType", skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<DeploymentMode>,
}

/// Lifecycle phase of the enclosing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    /// Resource creation.
    Create,
    /// Resource update.
    Update,
    /// Resource deletion; no actions run.
    Delete,
}

impl RequestType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Lifecycle event delivered by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    /// Lifecycle phase.
    pub request_type: RequestType,
    /// Raw resource properties, decoded by [`LifecycleEvent::deployment_request`].
    #[serde(default)]
    pub resource_properties: Value,
    /// Pre-signed callback URL the status report is sent to.
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    /// Identifier of the enclosing stack.
    pub stack_id: String,
    /// Identifier of this request.
    pub request_id: String,
    /// Logical identifier of the resource.
    pub logical_resource_id: String,
    /// Physical identifier assigned by a previous invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
}

impl LifecycleEvent {
    /// Decode the resource properties. Absent properties yield an empty request.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidRequest`] when the properties do not
    /// describe a deployment, for example an unknown action type.
    pub fn deployment_request(&self) -> DeployResult<DeploymentRequest> {
        if self.resource_properties.is_null() {
            return Ok(DeploymentRequest::default());
        }
        DeploymentRequest::deserialize(&self.resource_properties)
            .map_err(|source| DeployError::InvalidRequest { source })
    }
}

/// Runtime facts about the current invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Time left before the host terminates the invocation.
    pub remaining_time: Duration,
    /// Log stream identifier, also used as the fallback physical resource id.
    pub log_stream_name: String,
}
