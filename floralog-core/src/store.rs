//! Durable store gateway: dedup probe, two-part write, outcome mapping.
//!
//! The gateway drives a small per-submission state machine over an
//! external blob store: probe for the metadata object by hash, and when
//! absent, write the image object and the metadata object under their
//! respective namespaces. A duplicate is a successful outcome, not an
//! error. The store itself is the sole arbiter of existence; two clients
//! racing the same hash may both write, which is accepted because same
//! hash means same bytes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{FloralogError, Result};
use crate::observation::{ImageHash, Observation};

/// Namespace prefix for stored image objects.
pub const IMAGES_PREFIX: &str = "images";
/// Namespace prefix for stored metadata objects.
pub const METADATA_PREFIX: &str = "metadata";

/// Object key for an observation's image blob.
pub fn image_key(hash: &ImageHash) -> String {
    format!("{}/{}.png", IMAGES_PREFIX, hash)
}

/// Object key for an observation's metadata blob.
pub fn metadata_key(hash: &ImageHash) -> String {
    format!("{}/{}.json", METADATA_PREFIX, hash)
}

/// One stored object returned by a prefix listing.
#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub key: String,
    pub url: String,
}

/// External key/value object store capability.
///
/// Path-like keys, existence check, write, read, prefix listing. One
/// attempt per call; the gateway never retries on the store's behalf.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Write an object, returning its retrievable URL.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Read an object's bytes, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List objects under a key prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>>;

    /// The URL an object under `key` is (or would be) served from.
    fn url_for(&self, key: &str) -> String;
}

/// Submission phases, in order of progression.
///
/// `Checking` probes for the metadata object; existence short-circuits to
/// `Duplicate`, absence moves to `Writing`, and the two writes end in
/// `Stored` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Checking,
    Duplicate,
    Writing,
    Stored,
    Failed,
}

impl std::fmt::Display for SavePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SavePhase::Checking => "checking",
            SavePhase::Duplicate => "duplicate",
            SavePhase::Writing => "writing",
            SavePhase::Stored => "stored",
            SavePhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of a save attempt that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// True when the content already existed and nothing was written.
    pub duplicate: bool,
    pub image_url: String,
    pub metadata_url: String,
}

/// Store gateway owning the dedup probe and the two-part write.
pub struct StoreGateway {
    store: Arc<dyn BlobStore>,
    /// Fast path for repeat saves from this client: hash -> metadata URL.
    known: DashMap<String, String>,
}

impl StoreGateway {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            known: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Save an observation, create-if-absent.
    ///
    /// The observation must still carry inline image bytes. The metadata
    /// object is written with the image referenced by its stored URL, not
    /// the bytes. Either write failing leaves the sibling in place; a
    /// later resubmission rechecks existence and may then see a
    /// duplicate.
    #[instrument(level = "info", skip(self, observation), fields(hash = %observation.image_hash))]
    pub async fn save(&self, observation: &Observation) -> Result<SaveOutcome> {
        let hash = &observation.image_hash;
        let img_key = image_key(hash);
        let meta_key = metadata_key(hash);

        // Fast path: this client already stored the content.
        if let Some(meta_url) = self.known.get(hash.as_str()) {
            debug!(phase = %SavePhase::Duplicate, "known content, skipping store round trip");
            return Ok(SaveOutcome {
                duplicate: true,
                image_url: self.store.url_for(&img_key),
                metadata_url: meta_url.clone(),
            });
        }

        debug!(phase = %SavePhase::Checking, "probing store for existing metadata");
        if self.store.exists(&meta_key).await? {
            info!(phase = %SavePhase::Duplicate, "content already recorded");
            let meta_url = self.store.url_for(&meta_key);
            self.known.insert(hash.as_str().to_string(), meta_url.clone());
            return Ok(SaveOutcome {
                duplicate: true,
                image_url: self.store.url_for(&img_key),
                metadata_url: meta_url,
            });
        }

        debug!(phase = %SavePhase::Writing, "writing image and metadata objects");
        let image_bytes = observation.image_data.as_bytes().ok_or_else(|| {
            FloralogError::InvalidObservation(
                "cannot save an observation whose image is already a URL".to_string(),
            )
        })?;

        let image_url = match self
            .store
            .put(&img_key, image_bytes.to_vec(), "image/png")
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(phase = %SavePhase::Failed, error = %e, "image write failed");
                return Err(e);
            }
        };

        let stored_record = observation.clone().with_image_url(image_url.clone());
        let metadata_json = stored_record.to_json()?;
        let metadata_url = match self
            .store
            .put(&meta_key, metadata_json.into_bytes(), "application/json")
            .await
        {
            Ok(url) => url,
            Err(e) => {
                // The image object stays behind; the next attempt's probe
                // decides whether this counts as a duplicate.
                warn!(phase = %SavePhase::Failed, error = %e, "metadata write failed");
                return Err(e);
            }
        };

        info!(phase = %SavePhase::Stored, %image_url, "observation stored");
        self.known
            .insert(hash.as_str().to_string(), metadata_url.clone());
        Ok(SaveOutcome {
            duplicate: false,
            image_url,
            metadata_url,
        })
    }
}

/// HTTP object store client.
///
/// Speaks a plain REST dialect: HEAD for existence, PUT to write, GET to
/// read, and a JSON listing under `?prefix=`. Keys map onto URL paths
/// below the base URL.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

/// Listing response shape returned by the store.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    objects: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    key: String,
    url: Option<String>,
}

impl HttpBlobStore {
    /// Connect to the store at `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    #[instrument(level = "debug", skip(self))]
    async fn exists(&self, key: &str) -> Result<bool> {
        let response = self.client.head(self.object_url(key)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(FloralogError::StoreError(format!(
                "existence check for '{}' returned {}",
                key, status
            ))),
        }
    }

    #[instrument(level = "debug", skip(self, data), fields(bytes = data.len()))]
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        let url = self.object_url(key);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FloralogError::StoreError(format!(
                "write of '{}' returned {}: {}",
                key, status, body
            )));
        }
        Ok(url)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self.client.get(self.object_url(key)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            status => Err(FloralogError::StoreError(format!(
                "read of '{}' returned {}",
                key, status
            ))),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("prefix", prefix)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FloralogError::StoreError(format!(
                "listing under '{}' returned {}",
                prefix, status
            )));
        }

        let listing: ListResponse = response.json().await.map_err(|e| {
            FloralogError::StoreError(format!("malformed listing response: {}", e))
        })?;

        Ok(listing
            .objects
            .into_iter()
            .map(|entry| {
                let url = entry
                    .url
                    .unwrap_or_else(|| format!("{}/{}", self.base_url, entry.key));
                BlobEntry {
                    key: entry.key,
                    url,
                }
            })
            .collect())
    }

    fn url_for(&self, key: &str) -> String {
        self.object_url(key)
    }
}

/// In-memory store for tests and local/dev mode.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drop an object, simulating external deletion.
    pub fn remove(&self, key: &str) {
        self.objects.remove(key);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<String> {
        self.objects.insert(key.to_string(), data);
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.get(key).map(|entry| entry.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>> {
        let mut entries: Vec<BlobEntry> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| BlobEntry {
                key: entry.key().clone(),
                url: self.url_for(entry.key()),
            })
            .collect();
        // DashMap iteration order is arbitrary; keep listings stable.
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObservationBuilder;

    fn observation(bytes: &[u8]) -> Observation {
        ObservationBuilder::new(bytes.to_vec(), "a1b2c3d4")
            .with_captured_at(1_700_000_000)
            .build()
    }

    #[tokio::test]
    async fn test_first_save_is_stored() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = StoreGateway::new(store.clone());
        let obs = observation(b"leaf photo");

        let outcome = gateway.save(&obs).await.expect("save");
        assert!(!outcome.duplicate);
        assert!(store
            .exists(&image_key(&obs.image_hash))
            .await
            .expect("exists"));
        assert!(store
            .exists(&metadata_key(&obs.image_hash))
            .await
            .expect("exists"));
    }

    #[tokio::test]
    async fn test_second_save_is_duplicate() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = StoreGateway::new(store);
        let obs = observation(b"leaf photo");

        let first = gateway.save(&obs).await.expect("first save");
        let second = gateway.save(&obs).await.expect("second save");

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.metadata_url, second.metadata_url);
    }

    #[tokio::test]
    async fn test_duplicate_detected_across_gateways() {
        // A fresh gateway has an empty fast path, so detection must come
        // from the store probe.
        let store = Arc::new(MemoryBlobStore::new());
        let obs = observation(b"leaf photo");

        StoreGateway::new(store.clone())
            .save(&obs)
            .await
            .expect("first save");
        let outcome = StoreGateway::new(store)
            .save(&obs)
            .await
            .expect("second save");

        assert!(outcome.duplicate);
    }

    #[tokio::test]
    async fn test_different_content_stored_independently() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = StoreGateway::new(store.clone());

        let a = gateway.save(&observation(b"first plant")).await.expect("a");
        let b = gateway.save(&observation(b"second plant")).await.expect("b");

        assert!(!a.duplicate);
        assert!(!b.duplicate);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_metadata_object_references_image_url() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = StoreGateway::new(store.clone());
        let obs = observation(b"leaf photo");

        let outcome = gateway.save(&obs).await.expect("save");

        let stored = store
            .get(&metadata_key(&obs.image_hash))
            .await
            .expect("get")
            .expect("metadata present");
        let record = Observation::from_json(&String::from_utf8(stored).expect("utf8"))
            .expect("deserialize");

        assert_eq!(record.image_data.as_url(), Some(outcome.image_url.as_str()));
        assert_eq!(record.image_hash, obs.image_hash);
    }

    #[tokio::test]
    async fn test_partial_write_counts_as_duplicate_on_retry() {
        // Only the metadata object exists from an earlier partial write.
        let store = Arc::new(MemoryBlobStore::new());
        let obs = observation(b"leaf photo");
        let record = obs.clone().with_image_url("memory://orphan");
        store
            .put(
                &metadata_key(&obs.image_hash),
                record.to_json().expect("json").into_bytes(),
                "application/json",
            )
            .await
            .expect("seed metadata");

        let outcome = StoreGateway::new(store).save(&obs).await.expect("save");
        assert!(outcome.duplicate);
    }

    #[tokio::test]
    async fn test_save_rejects_url_only_observation() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = StoreGateway::new(store);
        let obs = observation(b"leaf photo").with_image_url("memory://images/x.png");

        let err = gateway.save(&obs).await.unwrap_err();
        assert!(matches!(err, FloralogError::InvalidObservation(_)));
    }

    #[tokio::test]
    async fn test_memory_store_list_is_prefix_scoped() {
        let store = MemoryBlobStore::new();
        store
            .put("images/aa.png", vec![1], "image/png")
            .await
            .expect("put");
        store
            .put("metadata/aa.json", vec![2], "application/json")
            .await
            .expect("put");

        let images = store.list("images/").await.expect("list");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].key, "images/aa.png");
    }

    #[test]
    fn test_key_layout() {
        let hash = ImageHash::from_bytes(b"x");
        assert!(image_key(&hash).starts_with("images/"));
        assert!(image_key(&hash).ends_with(".png"));
        assert!(metadata_key(&hash).starts_with("metadata/"));
        assert!(metadata_key(&hash).ends_with(".json"));
    }
}
