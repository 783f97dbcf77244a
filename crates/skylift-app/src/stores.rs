//! S3 store resolution, one cached client per bucket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use object_store::aws::AmazonS3Builder;
use skylift_deploy::{BlobStore, DeployError, DeployResult, ObjectStoreBlobs, StoreResolver};
use tracing::info;

/// Builds S3 clients from the `AWS_*` environment on first use of each bucket.
#[derive(Default)]
pub struct S3StoreResolver {
    endpoint: Option<String>,
    allow_http: bool,
    cache: Mutex<HashMap<String, Arc<dyn BlobStore>>>,
}

impl S3StoreResolver {
    /// Resolver using the default endpoint for the configured region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a custom S3-compatible endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>, allow_http: bool) -> Self {
        self.endpoint = endpoint;
        self.allow_http = allow_http;
        self
    }
}

impl StoreResolver for S3StoreResolver {
    fn resolve(&self, bucket: &str) -> DeployResult<Arc<dyn BlobStore>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = cache.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if self.allow_http {
            builder = builder.with_allow_http(true);
        }
        let s3 = builder
            .build()
            .map_err(|source| DeployError::StoreUnavailable {
                bucket: bucket.to_string(),
                source,
            })?;
        info!(bucket, endpoint = self.endpoint.as_deref(), "object store client ready");

        let store: Arc<dyn BlobStore> = Arc::new(ObjectStoreBlobs::new(Arc::new(s3)));
        cache.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }
}
