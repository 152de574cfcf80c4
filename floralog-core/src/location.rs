//! Best-available location resolution from layered evidence.
//!
//! Priority order: embedded image metadata, then a sufficiently fresh
//! cached sensor reading, then a live sensor call. Sensor unavailability
//! is a legitimate empty result, never a pipeline fault.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::observation::{Location, LocationSource};
use crate::sensor::{GeoSensor, PositionRequest};

/// Freshness window for reusing a cached sensor reading (5 minutes).
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(300);

struct CachedFix {
    fix: Location,
    read_at: Instant,
}

/// Single-slot cache for the most recent live sensor reading.
///
/// Constructed once per client session and threaded as a dependency.
/// Last-write-wins; there is no concurrent writer within one client.
pub struct LocationCache {
    slot: RwLock<Option<CachedFix>>,
    freshness: Duration,
}

impl LocationCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            freshness,
        }
    }

    /// The cached fix, if one exists and is younger than the window.
    /// Returned verbatim, keeping its original provenance tag.
    pub async fn fresh(&self) -> Option<Location> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|cached| cached.read_at.elapsed() < self.freshness)
            .map(|cached| cached.fix.clone())
    }

    /// Record a fresh sensor fix (value + timestamp).
    pub async fn store(&self, fix: Location) {
        let mut slot = self.slot.write().await;
        *slot = Some(CachedFix {
            fix,
            read_at: Instant::now(),
        });
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW)
    }
}

/// Resolve the best-available location. First evidence source wins:
///
/// 1. `embedded` from the image's own metadata (already `exif`-tagged).
/// 2. A cached sensor reading younger than the cache's freshness window.
/// 3. A fresh sensor call, `browser`-tagged, bounded by a hard timeout.
///    Timeout, denial, and position-unavailable all yield `None`.
///
/// Successful fresh reads update the cache for subsequent calls.
pub async fn resolve(
    embedded: Option<Location>,
    cache: &LocationCache,
    sensor: &dyn GeoSensor,
    request: &PositionRequest,
) -> Option<Location> {
    if let Some(location) = embedded {
        tracing::debug!(source = %location.source, "using embedded location");
        return Some(location);
    }

    if let Some(cached) = cache.fresh().await {
        tracing::debug!("reusing cached sensor location");
        return Some(cached);
    }

    // Outer timeout guards against a sensor that ignores its own.
    match tokio::time::timeout(request.timeout, sensor.current_position(request)).await {
        Ok(Ok(reading)) => {
            let fix = Location {
                latitude: reading.latitude,
                longitude: reading.longitude,
                accuracy: reading.accuracy,
                source: LocationSource::Browser,
            };
            cache.store(fix.clone()).await;
            Some(fix)
        }
        Ok(Err(err)) => {
            tracing::info!(error = %err, "geolocation unavailable, proceeding without");
            None
        }
        Err(_) => {
            tracing::info!(timeout = ?request.timeout, "geolocation timed out, proceeding without");
            None
        }
    }
}
