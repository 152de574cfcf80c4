//! Client-side persisted state: submitter identity and a rolling cache.
//!
//! A JSON file in the state directory backs both. The submitter ID is an
//! 8-character identifier generated once and reused for every later
//! session. The rolling cache memoizes computed values under
//! time-bucketed keys so entries age out naturally; a size ceiling clears
//! the whole cache with a warning rather than evicting piecemeal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FloralogError, Result};

/// Fixed key the submitter identifier is stored under.
const SUBMITTER_ID_KEY: &str = "floralog-user-id";
/// Length of the generated submitter identifier.
const SUBMITTER_ID_LEN: usize = 8;

/// Granularity of rolling-cache time buckets (10 minutes).
pub const DEFAULT_BUCKET_SECS: u64 = 600;
/// Ceiling on the serialized cache size before clear-and-warn (~5 MB).
pub const DEFAULT_SIZE_CEILING: usize = 5 * 1024 * 1024;
/// Salt folded into cache keys; bump to invalidate all entries at once.
const CACHE_VERSION_SALT: &str = "v1";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    values: HashMap<String, String>,
    #[serde(default)]
    cache: HashMap<String, String>,
}

/// File-backed local state, constructed once per session and threaded as
/// a dependency. Single client, single writer; every mutation is written
/// through to disk.
pub struct LocalState {
    path: PathBuf,
    file: StateFile,
    bucket_secs: u64,
    size_ceiling: usize,
}

impl LocalState {
    /// Open (or create) the state file at `dir/state.json`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(dir, DEFAULT_BUCKET_SECS, DEFAULT_SIZE_CEILING)
    }

    pub fn open_with(
        dir: impl AsRef<Path>,
        bucket_secs: u64,
        size_ceiling: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| FloralogError::StateError(format!("cannot create state dir: {}", e)))?;
        let path = dir.join("state.json");

        let file = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "state file unreadable, starting fresh");
                StateFile::default()
            }),
            Err(_) => StateFile::default(),
        };

        Ok(Self {
            path,
            file,
            bucket_secs,
            size_ceiling,
        })
    }

    /// The persisted submitter identifier, generating it on first use.
    pub fn submitter_id(&mut self) -> Result<String> {
        if let Some(id) = self.file.values.get(SUBMITTER_ID_KEY) {
            return Ok(id.clone());
        }

        let id = generate_submitter_id();
        info!(submitter_id = %id, "generated new submitter identifier");
        self.file
            .values
            .insert(SUBMITTER_ID_KEY.to_string(), id.clone());
        self.persist()?;
        Ok(id)
    }

    /// A cached value for `key`, if one exists in the current time bucket.
    pub fn cached(&self, key: &str) -> Option<&str> {
        self.file
            .cache
            .get(&self.bucket_key(key))
            .map(|s| s.as_str())
    }

    /// Store a value under `key` in the current time bucket.
    ///
    /// When the serialized cache would exceed the ceiling, the whole
    /// cache is cleared first (clear-and-warn, no piecemeal eviction).
    pub fn cache_put(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let current_size: usize = self
            .file
            .cache
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();

        if current_size + key.len() + value.len() > self.size_ceiling {
            warn!(
                size = current_size,
                ceiling = self.size_ceiling,
                "local cache over size ceiling, clearing"
            );
            self.file.cache.clear();
        }

        self.file.cache.insert(self.bucket_key(key), value);
        self.persist()
    }

    /// Drop cache entries from buckets other than the current one.
    pub fn prune_stale(&mut self) -> Result<()> {
        let bucket_suffix = format!("-{}-{}", current_bucket(self.bucket_secs), CACHE_VERSION_SALT);
        let before = self.file.cache.len();
        self.file.cache.retain(|key, _| key.ends_with(&bucket_suffix));
        let dropped = before - self.file.cache.len();
        if dropped > 0 {
            debug!(dropped, "pruned stale cache buckets");
            self.persist()?;
        }
        Ok(())
    }

    fn bucket_key(&self, key: &str) -> String {
        format!(
            "{}-{}-{}",
            key,
            current_bucket(self.bucket_secs),
            CACHE_VERSION_SALT
        )
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.file)
            .map_err(|e| FloralogError::StateError(format!("cannot serialize state: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| FloralogError::StateError(format!("cannot write state file: {}", e)))
    }
}

/// First 8 hex characters of a v4 UUID; enough to tell clients apart, no
/// authentication implied.
fn generate_submitter_id() -> String {
    Uuid::new_v4().simple().to_string()[..SUBMITTER_ID_LEN].to_string()
}

fn current_bucket(bucket_secs: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    now / bucket_secs
}
