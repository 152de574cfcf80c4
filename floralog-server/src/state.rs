//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;
use std::time::Duration;

use floralog_core::{
    BlobStore, HttpBlobStore, MemoryBlobStore, ObservationRepository, StoreGateway,
};

use crate::config::Config;

/// Outbound settings for the identification proxy.
#[derive(Debug, Clone)]
pub struct IdentifyProxy {
    /// Provider base URL; the project name is appended as a path segment.
    pub provider_url: String,
    /// Credential injected server-side, never exposed to clients.
    pub api_key: String,
}

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Blob store backing both gateway and repository
    pub store: Arc<dyn BlobStore>,
    /// Write side: dedup probe and two-part write
    pub gateway: Arc<StoreGateway>,
    /// Read side: listing and image resolution
    pub repository: Arc<ObservationRepository>,
    /// Identification proxy settings, None when no provider is configured
    pub identify_proxy: Option<Arc<IdentifyProxy>>,
}

impl AppState {
    /// State backed by an in-memory store. Used by tests and dev mode.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryBlobStore::new()), None)
    }

    /// State from server configuration: HTTP store when a URL is set,
    /// in-memory otherwise; proxy only when both provider settings exist.
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<dyn BlobStore> = match &config.store_url {
            Some(url) => {
                let timeout = Duration::from_secs(config.timeout_secs);
                match HttpBlobStore::new(url.clone(), timeout) {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        tracing::error!(error = %e, "cannot build HTTP store client, using in-memory store");
                        Arc::new(MemoryBlobStore::new())
                    }
                }
            }
            None => {
                tracing::warn!("no FLORALOG_STORE_URL configured, observations are not durable");
                Arc::new(MemoryBlobStore::new())
            }
        };

        let identify_proxy = match (&config.plant_api_url, &config.plant_api_key) {
            (Some(url), Some(key)) => Some(Arc::new(IdentifyProxy {
                provider_url: url.clone(),
                api_key: key.clone(),
            })),
            _ => {
                tracing::warn!("identification provider not configured, /identify disabled");
                None
            }
        };

        Self::with_store(store, identify_proxy)
    }

    fn with_store(store: Arc<dyn BlobStore>, identify_proxy: Option<Arc<IdentifyProxy>>) -> Self {
        Self {
            gateway: Arc::new(StoreGateway::new(store.clone())),
            repository: Arc::new(ObservationRepository::new(store.clone())),
            store,
            identify_proxy,
        }
    }
}
