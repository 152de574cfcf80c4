//! Floralog Core - Plant observation ingestion pipeline
//!
//! This crate takes a raw plant photo through location and capture-time
//! extraction, species identification, content addressing,
//! deduplication, and durable storage, producing a canonical observation
//! record.
//!
//! # Pipeline
//!
//! capture/upload → normalize → (identify ∥ resolve location) → build
//! record → store (dedup probe, two-part write). The repository reads
//! everything back for gallery and map views.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use floralog_core::{
//!     IngestPipeline, MemoryBlobStore, MockGeoSensor, MockIdentifier,
//!     PipelineConfig, StoreGateway,
//! };
//!
//! # async fn example(photo: &[u8]) -> floralog_core::Result<()> {
//! let gateway = StoreGateway::new(Arc::new(MemoryBlobStore::new()));
//! let pipeline = IngestPipeline::new(
//!     Arc::new(MockIdentifier::new()),
//!     Arc::new(MockGeoSensor::denied()),
//!     gateway,
//!     "a1b2c3d4",
//!     PipelineConfig::default(),
//! );
//!
//! let outcome = pipeline.ingest(photo).await?;
//! println!("{} (duplicate: {})", outcome.observation.image_hash, outcome.duplicate);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod identify;
pub mod ip;
pub mod location;
pub mod normalize;
pub mod observation;
pub mod pipeline;
pub mod repository;
pub mod sensor;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use error::{FloralogError, Result};
pub use identify::{
    HttpIdentifier, HttpIdentifierConfig, IdentifyOptions, MockIdentifier, SpeciesIdentifier,
};
pub use ip::IpLookup;
pub use location::LocationCache;
pub use normalize::{CaptureMetadata, NormalizedImage, NormalizerConfig};
pub use observation::{
    ImageData, ImageHash, Location, LocationSource, Observation, ObservationBuilder,
    SpeciesPrediction,
};
pub use pipeline::{BatchEntry, IngestOutcome, IngestPipeline, PipelineConfig};
pub use repository::ObservationRepository;
pub use sensor::{
    CameraSource, CameraStream, CameraStreamGuard, GeoSensor, MockCamera, MockGeoSensor,
    PositionRequest, SensorError, SensorReading,
};
pub use state::LocalState;
pub use store::{
    image_key, metadata_key, BlobEntry, BlobStore, HttpBlobStore, MemoryBlobStore, SaveOutcome,
    SavePhase, StoreGateway,
};
