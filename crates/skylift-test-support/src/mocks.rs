//! Fakes for the blob store and callback seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::{Attribute, ObjectStore};
use skylift_deploy::{
    BlobStore, CallbackTransport, DeliveryError, DeployError, DeployResult, ObjectPath,
    ObjectStoreBlobs,
};
use tokio::time::{self, Instant};

/// In-memory blob store with injectable failures and latency.
pub struct FlakyBlobStore {
    memory: Arc<InMemory>,
    blobs: ObjectStoreBlobs,
    failing_puts: Vec<String>,
    failing_deletes: Vec<String>,
    failing_list: bool,
    put_delay: Option<Duration>,
    puts: AtomicUsize,
    put_order: Mutex<Vec<String>>,
}

impl Default for FlakyBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyBlobStore {
    /// Store that never fails.
    #[must_use]
    pub fn new() -> Self {
        let memory = Arc::new(InMemory::new());
        let shared: Arc<dyn ObjectStore> = memory.clone();
        Self {
            memory,
            blobs: ObjectStoreBlobs::new(shared),
            failing_puts: Vec::new(),
            failing_deletes: Vec::new(),
            failing_list: false,
            put_delay: None,
            puts: AtomicUsize::new(0),
            put_order: Mutex::new(Vec::new()),
        }
    }

    /// Fail every put whose key contains `fragment`.
    #[must_use]
    pub fn fail_puts_matching(mut self, fragment: impl Into<String>) -> Self {
        self.failing_puts.push(fragment.into());
        self
    }

    /// Fail every delete whose key contains `fragment`.
    #[must_use]
    pub fn fail_deletes_matching(mut self, fragment: impl Into<String>) -> Self {
        self.failing_deletes.push(fragment.into());
        self
    }

    /// Fail every listing.
    #[must_use]
    pub const fn fail_listing(mut self) -> Self {
        self.failing_list = true;
        self
    }

    /// Sleep for `delay` before each put.
    #[must_use]
    pub const fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    /// Number of put attempts, including failed ones.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Keys in the order their puts started.
    #[must_use]
    pub fn put_order(&self) -> Vec<String> {
        self.put_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write an object directly, bypassing failure injection.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    pub async fn seed(&self, key: &str, body: &'static [u8]) -> DeployResult<()> {
        let key = skylift_deploy::parse_key(key)?;
        self.blobs.put_object(&key, Bytes::from_static(body), None).await
    }

    /// All stored keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn keys(&self) -> DeployResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .blobs
            .list_keys(None)
            .await?
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Body of the object at `key`, if present.
    pub async fn body(&self, key: &str) -> Option<Bytes> {
        let key = skylift_deploy::parse_key(key).ok()?;
        self.memory.get(&key).await.ok()?.bytes().await.ok()
    }

    /// Content type recorded for `key`, if any.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        let key = skylift_deploy::parse_key(key).ok()?;
        let result = self.memory.get(&key).await.ok()?;
        result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| AsRef::<str>::as_ref(value).to_string())
    }

    fn injected(operation: &'static str, key: &ObjectPath) -> DeployError {
        DeployError::Store {
            operation,
            key: key.as_ref().to_string(),
            source: object_store::Error::Generic {
                store: "flaky",
                source: "injected failure".into(),
            },
        }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put_object(
        &self,
        key: &ObjectPath,
        body: Bytes,
        content_type: Option<&str>,
    ) -> DeployResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.put_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.as_ref().to_string());
        if let Some(delay) = self.put_delay {
            time::sleep(delay).await;
        }
        if self
            .failing_puts
            .iter()
            .any(|fragment| key.as_ref().contains(fragment.as_str()))
        {
            return Err(Self::injected("put_object", key));
        }
        self.blobs.put_object(key, body, content_type).await
    }

    async fn delete_object(&self, key: &ObjectPath) -> DeployResult<()> {
        if self
            .failing_deletes
            .iter()
            .any(|fragment| key.as_ref().contains(fragment.as_str()))
        {
            return Err(Self::injected("delete_object", key));
        }
        self.blobs.delete_object(key).await
    }

    async fn list_keys(&self, prefix: Option<&ObjectPath>) -> DeployResult<Vec<ObjectPath>> {
        if self.failing_list {
            return Err(Self::injected(
                "list_keys",
                prefix.unwrap_or(&ObjectPath::default()),
            ));
        }
        self.blobs.list_keys(prefix).await
    }
}

/// Scripted reply for one callback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Accept the report.
    Accept,
    /// Reject with this HTTP status.
    Reject(u16),
    /// Never answer within any reasonable timeout.
    Hang,
}

/// One recorded callback attempt.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Target URL.
    pub url: String,
    /// Request body.
    pub body: String,
    /// When the attempt started.
    pub at: Instant,
}

impl RecordedCall {
    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

/// Callback transport that replays a script and records every attempt.
///
/// Attempts beyond the end of the script are accepted.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    /// Transport that accepts every attempt.
    #[must_use]
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Transport that replies with `script` in order.
    #[must_use]
    pub fn scripted(script: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CallbackTransport for ScriptedTransport {
    async fn put(&self, url: &str, body: String) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                url: url.to_string(),
                body,
                at: Instant::now(),
            });
        let reply = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ScriptedReply::Accept);
        match reply {
            ScriptedReply::Accept => Ok(()),
            ScriptedReply::Reject(status) => Err(DeliveryError::Status {
                url: url.to_string(),
                status,
            }),
            ScriptedReply::Hang => {
                time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flaky_store_injects_put_failures() -> anyhow::Result<()> {
        let store = FlakyBlobStore::new().fail_puts_matching("broken");
        let ok = skylift_deploy::parse_key("site/ok.txt")?;
        let broken = skylift_deploy::parse_key("site/broken.txt")?;
        store.put_object(&ok, Bytes::from_static(b"ok"), Some("text/plain")).await?;
        assert!(store.put_object(&broken, Bytes::from_static(b"x"), None).await.is_err());
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.put_order(), vec!["site/ok.txt", "site/broken.txt"]);
        assert_eq!(store.keys().await?, vec!["site/ok.txt"]);
        assert_eq!(store.content_type("site/ok.txt").await.as_deref(), Some("text/plain"));
        Ok(())
    }

    #[tokio::test]
    async fn scripted_transport_replays_then_accepts() {
        let transport = ScriptedTransport::scripted([ScriptedReply::Reject(500)]);
        assert!(transport.put("http://x", "a".to_string()).await.is_err());
        assert!(transport.put("http://x", "b".to_string()).await.is_ok());
        let bodies: Vec<String> = transport.calls().into_iter().map(|call| call.body).collect();
        assert_eq!(bodies, vec!["a", "b"]);
    }
}
