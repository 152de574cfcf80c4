//! Read side of the store: list and reassemble stored observations.
//!
//! The repository pulls metadata objects from the blob store, resolves
//! each record's image concurrently, and hands the view layer fully
//! assembled in-memory observations. One broken record never breaks the
//! listing.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::observation::{ImageHash, Observation};
use crate::store::{metadata_key, BlobStore, METADATA_PREFIX};

pub struct ObservationRepository {
    store: Arc<dyn BlobStore>,
}

impl ObservationRepository {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// List all stored observations, most recent capture first.
    ///
    /// Optionally scoped to one submitter. Records whose metadata is
    /// unreadable or whose image resolution fails are dropped with a
    /// warning, never failing the listing as a whole.
    #[instrument(level = "info", skip(self))]
    pub async fn list_all(&self, submitter_id: Option<&str>) -> crate::Result<Vec<Observation>> {
        let metadata = self.list_metadata().await?;

        let resolutions = metadata
            .into_iter()
            .filter(|record| match submitter_id {
                Some(id) => record.submitter_id == id,
                None => true,
            })
            .map(|record| self.resolve_image(record));
        let resolved = join_all(resolutions).await;

        let mut observations: Vec<Observation> = resolved.into_iter().flatten().collect();
        // Stable sort keeps store insertion order among equal timestamps.
        observations.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));

        debug!(count = observations.len(), "assembled observation listing");
        Ok(observations)
    }

    /// All metadata records as stored, images left as URLs.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_metadata(&self) -> crate::Result<Vec<Observation>> {
        let entries = self.store.list(&format!("{}/", METADATA_PREFIX)).await?;

        let reads = entries.iter().map(|entry| self.store.get(&entry.key));
        let bodies = join_all(reads).await;

        let mut records = Vec::new();
        for (entry, body) in entries.iter().zip(bodies) {
            match body {
                Ok(Some(bytes)) => match parse_metadata(&bytes) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(key = %entry.key, error = %e, "skipping unreadable metadata object")
                    }
                },
                Ok(None) => {
                    // Listed but gone by the time we read it.
                    warn!(key = %entry.key, "metadata object vanished between list and read")
                }
                Err(e) => warn!(key = %entry.key, error = %e, "skipping unreachable metadata object"),
            }
        }
        Ok(records)
    }

    /// Single observation by hash, fully assembled, `None` when absent.
    #[instrument(level = "debug", skip(self), fields(hash = %hash))]
    pub async fn get(&self, hash: &ImageHash) -> crate::Result<Option<Observation>> {
        let bytes = match self.store.get(&metadata_key(hash)).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let record = parse_metadata(&bytes)?;
        Ok(self.resolve_image(record).await)
    }

    /// Swap a record's image URL for the fetched bytes. Failures drop the
    /// record with a warning.
    async fn resolve_image(&self, record: Observation) -> Option<Observation> {
        // Inline records (fresh, unstored) need no resolution.
        if record.image_data.is_inline() {
            return Some(record);
        }

        // The metadata's image URL and the store's key layout agree by
        // construction, so the hash alone determines the key.
        let key = crate::store::image_key(&record.image_hash);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => Some(Observation {
                image_data: crate::observation::ImageData::Inline(bytes),
                ..record
            }),
            Ok(None) => {
                warn!(hash = %record.image_hash, "image object missing, dropping record");
                None
            }
            Err(e) => {
                warn!(hash = %record.image_hash, error = %e, "image unreachable, dropping record");
                None
            }
        }
    }
}

fn parse_metadata(bytes: &[u8]) -> crate::Result<Observation> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        crate::FloralogError::SerializationError(format!("metadata is not UTF-8: {}", e))
    })?;
    Observation::from_json(text)
}
