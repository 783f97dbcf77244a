//! Blob store seam and the `object_store` adapter.
//!
//! # Design
//! - `BlobStore` is the narrow surface the executor needs: put, delete, list.
//! - `StoreResolver` maps an action's bucket name to a store so actions may
//!   target several buckets within one invocation.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::{
    Attribute, Attributes, ObjectMeta, ObjectStore, PutMultipartOptions, PutOptions, PutPayload,
    WriteMultipart,
};
use tokio::io::AsyncReadExt;

use crate::error::{DeployError, DeployResult};

pub use object_store::path::Path as ObjectPath;

/// Part size used for streamed uploads.
pub const MULTIPART_CHUNK_SIZE: usize = 8 * 1024 * 1024;
const MAX_PARTS_IN_FLIGHT: usize = 4;
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Object storage operations used by deployment actions.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `body` at `key`, replacing any existing object.
    async fn put_object(
        &self,
        key: &ObjectPath,
        body: Bytes,
        content_type: Option<&str>,
    ) -> DeployResult<()>;

    /// Upload the file at `path` to `key` without holding it in memory.
    ///
    /// The default reads the file and delegates to [`BlobStore::put_object`].
    async fn put_file(
        &self,
        key: &ObjectPath,
        path: &Path,
        content_type: Option<&str>,
    ) -> DeployResult<()> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|source| DeployError::io("upload.read", path, source))?;
        self.put_object(key, Bytes::from(body), content_type).await
    }

    /// Delete the object at `key`. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &ObjectPath) -> DeployResult<()>;

    /// List every key under `prefix` (all keys when `None`).
    async fn list_keys(&self, prefix: Option<&ObjectPath>) -> DeployResult<Vec<ObjectPath>>;
}

/// [`BlobStore`] backed by any [`ObjectStore`] implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreBlobs {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBlobs {
    /// Wrap an object store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    async fn put_object(
        &self,
        key: &ObjectPath,
        body: Bytes,
        content_type: Option<&str>,
    ) -> DeployResult<()> {
        let options = PutOptions {
            attributes: content_attributes(content_type),
            ..PutOptions::default()
        };
        self.store
            .put_opts(key, PutPayload::from(body), options)
            .await
            .map(|_| ())
            .map_err(|source| DeployError::store("put_object", key.as_ref(), source))
    }

    async fn put_file(
        &self,
        key: &ObjectPath,
        path: &Path,
        content_type: Option<&str>,
    ) -> DeployResult<()> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|source| DeployError::io("upload.open", path, source))?;
        let options = PutMultipartOptions {
            attributes: content_attributes(content_type),
            ..PutMultipartOptions::default()
        };
        let upload = self
            .store
            .put_multipart_opts(key, options)
            .await
            .map_err(|source| DeployError::store("put_multipart", key.as_ref(), source))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_CHUNK_SIZE);

        let mut buffer = vec![0; READ_BUFFER_SIZE];
        loop {
            let read = match file.read(&mut buffer).await {
                Ok(read) => read,
                Err(source) => {
                    // The read error is the one worth reporting.
                    let _ = writer.abort().await;
                    return Err(DeployError::io("upload.read", path, source));
                }
            };
            if read == 0 {
                break;
            }
            writer
                .wait_for_capacity(MAX_PARTS_IN_FLIGHT)
                .await
                .map_err(|source| DeployError::store("put_multipart", key.as_ref(), source))?;
            writer.write(&buffer[..read]);
        }
        writer
            .finish()
            .await
            .map(|_| ())
            .map_err(|source| DeployError::store("put_multipart", key.as_ref(), source))
    }

    async fn delete_object(&self, key: &ObjectPath) -> DeployResult<()> {
        match self.store.delete(key).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(source) => Err(DeployError::store("delete_object", key.as_ref(), source)),
        }
    }

    async fn list_keys(&self, prefix: Option<&ObjectPath>) -> DeployResult<Vec<ObjectPath>> {
        let listed: Vec<ObjectMeta> = self
            .store
            .list(prefix)
            .try_collect()
            .await
            .map_err(|source| {
                DeployError::store(
                    "list_keys",
                    prefix.map_or("", |prefix| prefix.as_ref()),
                    source,
                )
            })?;
        Ok(listed.into_iter().map(|meta| meta.location).collect())
    }
}

fn content_attributes(content_type: Option<&str>) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(content_type) = content_type {
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
    }
    attributes
}

/// Resolves the store responsible for a bucket.
pub trait StoreResolver: Send + Sync {
    /// Store for `bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error when no store is available for the bucket.
    fn resolve(&self, bucket: &str) -> DeployResult<Arc<dyn BlobStore>>;
}

/// Resolver over a fixed bucket-to-store map.
#[derive(Default, Clone)]
pub struct StaticStoreResolver {
    stores: HashMap<String, Arc<dyn BlobStore>>,
}

impl StaticStoreResolver {
    /// Empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` for `bucket`.
    #[must_use]
    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }
}

impl StoreResolver for StaticStoreResolver {
    fn resolve(&self, bucket: &str) -> DeployResult<Arc<dyn BlobStore>> {
        self.stores
            .get(bucket)
            .cloned()
            .ok_or_else(|| DeployError::UnknownBucket {
                bucket: bucket.to_string(),
            })
    }
}

/// Build the destination key for `relative` under `prefix`.
///
/// Segments are joined with `/`; empty segments from leading, trailing, or
/// doubled slashes are dropped.
///
/// # Errors
///
/// Returns [`DeployError::InvalidKey`] if a segment is not a valid object key part.
pub fn object_key(prefix: Option<&str>, relative: &Path) -> DeployResult<ObjectPath> {
    let mut segments: Vec<String> = prefix
        .unwrap_or_default()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            segments.push(part.to_string_lossy().into_owned());
        }
    }
    parse_key(&segments.join("/"))
}

/// Normalise a caller-supplied key or prefix.
///
/// # Errors
///
/// Returns [`DeployError::InvalidKey`] when the key cannot be represented.
pub fn parse_key(raw: &str) -> DeployResult<ObjectPath> {
    ObjectPath::parse(raw).or_else(|_| {
        let collapsed = raw
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        ObjectPath::parse(&collapsed).map_err(|source| DeployError::InvalidKey {
            key: raw.to_string(),
            source,
        })
    })
}
