//! The observation ingestion pipeline.
//!
//! One place wires the stages together: normalize the raw image, pull
//! capture metadata from the original bytes, then identify the species
//! and resolve the location concurrently, build the canonical record,
//! and hand it to the store gateway. Batches run strictly sequentially
//! with a fixed pause between files as a courtesy to the provider's rate
//! limits.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::identify::{IdentifyOptions, SpeciesIdentifier};
use crate::ip::IpLookup;
use crate::location::{self, LocationCache};
use crate::normalize::{self, NormalizerConfig};
use crate::observation::{Observation, ObservationBuilder};
use crate::sensor::{GeoSensor, PositionRequest};
use crate::store::{SaveOutcome, StoreGateway};
use crate::Result;

/// Pause between files in a batch upload (1 second).
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub normalizer: NormalizerConfig,
    pub identify: IdentifyOptions,
    pub position: PositionRequest,
    /// Inter-file pause for batch ingestion.
    pub batch_pause: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            identify: IdentifyOptions::default(),
            position: PositionRequest::default(),
            batch_pause: DEFAULT_BATCH_PAUSE,
        }
    }
}

/// Result of one successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The record as built, image still inline.
    pub observation: Observation,
    /// True when the store already held this content.
    pub duplicate: bool,
    pub image_url: String,
    pub metadata_url: String,
}

/// One entry of a batch result. The batch always yields one entry per
/// input file, failures included.
pub struct BatchEntry {
    pub name: String,
    pub result: Result<IngestOutcome>,
}

/// The wired ingestion pipeline.
///
/// Owns its collaborators for the lifetime of a client session. The
/// location cache and the gateway's fast-path table are the only shared
/// mutable state, both single-client and last-write-wins.
pub struct IngestPipeline {
    identifier: Arc<dyn SpeciesIdentifier>,
    sensor: Arc<dyn GeoSensor>,
    location_cache: LocationCache,
    gateway: StoreGateway,
    ip_lookup: Option<IpLookup>,
    known_ip: Option<String>,
    submitter_id: String,
    config: PipelineConfig,
}

impl IngestPipeline {
    pub fn new(
        identifier: Arc<dyn SpeciesIdentifier>,
        sensor: Arc<dyn GeoSensor>,
        gateway: StoreGateway,
        submitter_id: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            identifier,
            sensor,
            location_cache: LocationCache::default(),
            gateway,
            ip_lookup: None,
            known_ip: None,
            submitter_id: submitter_id.into(),
            config,
        }
    }

    /// Enable best-effort submitter IP resolution.
    pub fn with_ip_lookup(mut self, lookup: IpLookup) -> Self {
        self.ip_lookup = Some(lookup);
        self
    }

    /// Use an already-resolved submitter IP, skipping the lookup.
    ///
    /// Callers that memoize the external IP (it rarely changes within a
    /// session) hand it in here instead of paying a network round trip
    /// per ingestion.
    pub fn with_known_ip(mut self, ip: impl Into<String>) -> Self {
        self.known_ip = Some(ip.into());
        self
    }

    /// Ingest one raw image through the full pipeline.
    ///
    /// Decode failure aborts with an error the caller surfaces; sensor
    /// and IP unavailability degrade to absent fields. Identification
    /// transport failures abort, a provider no-match does not.
    #[instrument(level = "info", skip_all, fields(raw_bytes = raw.len()))]
    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestOutcome> {
        let normalized = normalize::normalize(raw, &self.config.normalizer)?;
        // EXIF lives in the original bytes; normalization strips it.
        let capture = normalize::extract_capture_metadata(raw);

        let (predictions, resolved, submitter_ip) = tokio::join!(
            self.identifier
                .identify(&normalized.data, &self.config.identify),
            location::resolve(
                capture.location,
                &self.location_cache,
                self.sensor.as_ref(),
                &self.config.position,
            ),
            self.lookup_ip(),
        );
        let predictions = predictions?;

        let mut builder = ObservationBuilder::new(normalized.data, self.submitter_id.clone())
            .with_location(resolved)
            .with_predictions(predictions)
            .with_submitter_ip(submitter_ip);
        if let Some(timestamp) = capture.captured_at {
            builder = builder.with_captured_at(timestamp);
        }
        let observation = builder.build();

        let SaveOutcome {
            duplicate,
            image_url,
            metadata_url,
        } = self.gateway.save(&observation).await?;

        info!(
            hash = %observation.image_hash,
            duplicate,
            predictions = observation.predictions.len(),
            has_location = observation.location.is_some(),
            "ingestion complete"
        );

        Ok(IngestOutcome {
            observation,
            duplicate,
            image_url,
            metadata_url,
        })
    }

    /// Ingest a batch of named files, strictly sequentially.
    ///
    /// One entry per input, in input order; a failing file is recorded
    /// and the batch continues. A fixed pause separates consecutive
    /// files.
    #[instrument(level = "info", skip_all, fields(files = files.len()))]
    pub async fn ingest_batch(&self, files: &[(String, Vec<u8>)]) -> Vec<BatchEntry> {
        let mut entries = Vec::with_capacity(files.len());

        for (index, (name, bytes)) in files.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            let result = self.ingest(bytes).await;
            if let Err(e) = &result {
                warn!(file = %name, error = %e, "batch file failed, continuing");
            }
            entries.push(BatchEntry {
                name: name.clone(),
                result,
            });
        }

        entries
    }

    async fn lookup_ip(&self) -> Option<String> {
        if let Some(ip) = &self.known_ip {
            return Some(ip.clone());
        }
        match &self.ip_lookup {
            Some(lookup) => lookup.current_ip().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::MockIdentifier;
    use crate::observation::LocationSource;
    use crate::sensor::MockGeoSensor;
    use crate::store::MemoryBlobStore;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn test_jpeg(width: u32, height: u32, tint: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([tint, 120, 90]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_with_encoder(image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut cursor,
            90,
        ))
        .expect("encode test image");
        cursor.into_inner()
    }

    fn pipeline(identifier: MockIdentifier, sensor: MockGeoSensor) -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(identifier),
            Arc::new(sensor),
            StoreGateway::new(Arc::new(MemoryBlobStore::new())),
            "a1b2c3d4",
            PipelineConfig {
                batch_pause: Duration::from_millis(1),
                ..PipelineConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_ingest_produces_stored_observation() {
        let pipeline = pipeline(
            MockIdentifier::new(),
            MockGeoSensor::with_fix(48.85, 2.35, Some(10.0)),
        );

        let outcome = pipeline.ingest(&test_jpeg(800, 600, 10)).await.expect("ingest");

        assert!(!outcome.duplicate);
        assert!(!outcome.observation.predictions.is_empty());
        let location = outcome.observation.location.expect("location");
        assert_eq!(location.source, LocationSource::Browser);
        assert_eq!(outcome.observation.submitter_id, "a1b2c3d4");
    }

    #[tokio::test]
    async fn test_reingest_same_image_is_duplicate() {
        let pipeline = pipeline(MockIdentifier::new(), MockGeoSensor::denied());
        let raw = test_jpeg(800, 600, 10);

        let first = pipeline.ingest(&raw).await.expect("first");
        let second = pipeline.ingest(&raw).await.expect("second");

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(
            first.observation.image_hash,
            second.observation.image_hash
        );
    }

    #[tokio::test]
    async fn test_denied_sensor_gives_locationless_record() {
        let pipeline = pipeline(MockIdentifier::new(), MockGeoSensor::denied());

        let outcome = pipeline.ingest(&test_jpeg(400, 300, 20)).await.expect("ingest");
        assert!(outcome.observation.location.is_none());
    }

    #[tokio::test]
    async fn test_known_ip_lands_on_record_without_lookup() {
        let pipeline = pipeline(MockIdentifier::new(), MockGeoSensor::denied())
            .with_known_ip("203.0.113.9");

        let outcome = pipeline.ingest(&test_jpeg(400, 300, 30)).await.expect("ingest");
        assert_eq!(
            outcome.observation.submitter_ip.as_deref(),
            Some("203.0.113.9")
        );
    }

    #[tokio::test]
    async fn test_no_match_identification_is_not_an_error() {
        let pipeline = pipeline(MockIdentifier::empty(), MockGeoSensor::denied());

        let outcome = pipeline.ingest(&test_jpeg(400, 300, 20)).await.expect("ingest");
        assert!(outcome.observation.predictions.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_ingest() {
        let pipeline = pipeline(
            MockIdentifier::failing(500, "provider down"),
            MockGeoSensor::denied(),
        );

        let err = pipeline.ingest(&test_jpeg(400, 300, 20)).await.unwrap_err();
        assert!(matches!(
            err,
            crate::FloralogError::ProviderError { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_corrupt_image_aborts_ingest() {
        let pipeline = pipeline(MockIdentifier::new(), MockGeoSensor::denied());

        let err = pipeline.ingest(b"not an image").await.unwrap_err();
        assert!(matches!(err, crate::FloralogError::DecodeError(_)));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let pipeline = pipeline(MockIdentifier::new(), MockGeoSensor::denied());
        let files = vec![
            ("one.jpg".to_string(), test_jpeg(300, 200, 30)),
            ("bad.jpg".to_string(), b"corrupt".to_vec()),
            ("three.jpg".to_string(), test_jpeg(300, 200, 60)),
        ];

        let entries = pipeline.ingest_batch(&files).await;

        assert_eq!(entries.len(), 3);
        assert!(entries[0].result.is_ok());
        assert!(matches!(
            entries[1].result.as_ref().unwrap_err(),
            crate::FloralogError::DecodeError(_)
        ));
        assert!(entries[2].result.is_ok());
        assert_eq!(entries[0].name, "one.jpg");
        assert_eq!(entries[1].name, "bad.jpg");
    }

    #[tokio::test]
    async fn test_batch_entries_keep_input_order() {
        let pipeline = pipeline(MockIdentifier::new(), MockGeoSensor::denied());
        let files = vec![
            ("a.jpg".to_string(), test_jpeg(100, 100, 1)),
            ("b.jpg".to_string(), test_jpeg(100, 100, 2)),
        ];

        let entries = pipeline.ingest_batch(&files).await;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }

    #[tokio::test]
    async fn test_sensor_fix_is_cached_across_ingests() {
        // First ingest reads the sensor; drop in a denying sensor clone is
        // not possible with one pipeline, so assert via the cache instead.
        let pipeline = pipeline(
            MockIdentifier::new(),
            MockGeoSensor::with_fix(1.0, 2.0, None),
        );
        pipeline.ingest(&test_jpeg(100, 100, 5)).await.expect("ingest");

        let cached = pipeline.location_cache.fresh().await.expect("cached fix");
        assert_eq!(cached.latitude, 1.0);
    }
}
