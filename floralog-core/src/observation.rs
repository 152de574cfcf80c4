use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{FloralogError, Result};

/// Number of hex characters kept from the full SHA-256 digest.
const IMAGE_HASH_HEX_LEN: usize = 16;

/// Content-derived identifier for a normalized image.
///
/// The hash is a pure function of the image's encoded bytes - never of
/// location, time, or predictions - so identical images always collide
/// on the same key and dedupe at the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHash(String);

impl ImageHash {
    /// Compute the hash from normalized image bytes.
    ///
    /// First 16 hex characters of the SHA-256 digest. Deterministic across
    /// platforms and repeated computation.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();

        let full = hex::encode(digest);
        Self(full[..IMAGE_HASH_HEX_LEN].to_string())
    }

    /// Parse a hash from its string form, validating shape.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != IMAGE_HASH_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FloralogError::InvalidObservation(format!(
                "invalid image hash '{}': expected {} hex characters",
                s, IMAGE_HASH_HEX_LEN
            )));
        }
        Ok(Self(s.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin of a location value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// Embedded in the image's metadata tags
    Exif,
    /// Live device geolocation sensor
    Browser,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSource::Exif => write!(f, "exif"),
            LocationSource::Browser => write!(f, "browser"),
        }
    }
}

/// A resolved capture location with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy in meters, or altitude when the source tags only
    /// carry altitude. Absent when neither is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub source: LocationSource,
}

/// One candidate species returned by the identification provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesPrediction {
    /// Provider confidence score in [0, 1]
    pub confidence: f64,
    pub species: Option<String>,
    pub genus: Option<String>,
    pub family: Option<String>,
    #[serde(default)]
    pub common_names: Vec<String>,
    pub gbif_id: Option<String>,
    pub powo_id: Option<String>,
    pub iucn_id: Option<String>,
    pub iucn_category: Option<String>,
}

/// The normalized image payload of an observation.
///
/// Inline bytes before storage, a retrievable URL after. Both forms
/// serialize to a single wire string: a `data:` URL for inline bytes, the
/// plain URL otherwise. Deserialization branches on the `data:` scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageData {
    Inline(Vec<u8>),
    Url(String),
}

impl ImageData {
    /// Wire-string form: data URL for inline bytes, the URL itself otherwise.
    pub fn to_wire(&self) -> String {
        match self {
            ImageData::Inline(bytes) => {
                format!("data:image/jpeg;base64,{}", BASE64.encode(bytes))
            }
            ImageData::Url(url) => url.clone(),
        }
    }

    /// Parse the wire-string form back into the matching variant.
    pub fn from_wire(s: &str) -> Result<Self> {
        match s.strip_prefix("data:") {
            Some(rest) => {
                let (_, encoded) = rest.split_once(";base64,").ok_or_else(|| {
                    FloralogError::SerializationError("malformed image data URL".to_string())
                })?;
                let bytes = BASE64.decode(encoded).map_err(|e| {
                    FloralogError::SerializationError(format!("invalid base64 image data: {}", e))
                })?;
                Ok(ImageData::Inline(bytes))
            }
            None => Ok(ImageData::Url(s.to_string())),
        }
    }

    /// Inline bytes, if this value still carries them.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ImageData::Inline(bytes) => Some(bytes),
            ImageData::Url(_) => None,
        }
    }

    /// Stored URL, if this value has been persisted.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            ImageData::Inline(_) => None,
            ImageData::Url(url) => Some(url),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageData::Inline(_))
    }
}

impl Serialize for ImageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for ImageData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ImageData::from_wire(&s).map_err(serde::de::Error::custom)
    }
}

/// One canonical plant-sighting record.
///
/// Constructed by [`ObservationBuilder`] from a live capture, or by
/// [`Observation::from_json`] from a stored record. Immutable once handed
/// to the store gateway - the store supports create-if-absent only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Primary key and deduplication key
    pub image_hash: ImageHash,
    /// Normalized image, inline pre-storage / URL post-storage
    pub image_data: ImageData,
    /// Best-available capture location, absent when no evidence was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Unix timestamp (seconds): embedded capture time, else ingestion time
    pub captured_at: i64,
    /// Candidate species, descending confidence, never null
    #[serde(default)]
    pub predictions: Vec<SpeciesPrediction>,
    /// Best-effort external IP of the submitting client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter_ip: Option<String>,
    /// Locally generated 8-character client identifier
    pub submitter_id: String,
}

impl Observation {
    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FloralogError::SerializationError(e.to_string()))
    }

    /// Deserialize from the JSON wire format.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FloralogError::SerializationError(e.to_string()))
    }

    /// Replace the inline image payload with its stored URL.
    ///
    /// Used by the gateway when writing the metadata object, which
    /// references the image by URL rather than carrying the bytes.
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_data = ImageData::Url(url.into());
        self
    }
}

/// Builder assembling an [`Observation`] from pipeline outputs.
pub struct ObservationBuilder {
    image_bytes: Vec<u8>,
    location: Option<Location>,
    captured_at: Option<i64>,
    predictions: Vec<SpeciesPrediction>,
    submitter_ip: Option<String>,
    submitter_id: String,
}

impl ObservationBuilder {
    /// Start a builder from normalized image bytes and the client identifier.
    pub fn new(image_bytes: Vec<u8>, submitter_id: impl Into<String>) -> Self {
        Self {
            image_bytes,
            location: None,
            captured_at: None,
            predictions: Vec::new(),
            submitter_ip: None,
            submitter_id: submitter_id.into(),
        }
    }

    /// Set the resolved location, if any.
    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Set the embedded capture timestamp (Unix seconds).
    ///
    /// When never called, `build` falls back to ingestion wall-clock time.
    pub fn with_captured_at(mut self, timestamp: i64) -> Self {
        self.captured_at = Some(timestamp);
        self
    }

    /// Set the filtered species predictions.
    pub fn with_predictions(mut self, predictions: Vec<SpeciesPrediction>) -> Self {
        self.predictions = predictions;
        self
    }

    /// Set the best-effort submitter IP.
    pub fn with_submitter_ip(mut self, ip: Option<String>) -> Self {
        self.submitter_ip = ip;
        self
    }

    /// Assemble the record. The hash is computed here, from the image
    /// bytes alone.
    pub fn build(self) -> Observation {
        let image_hash = ImageHash::from_bytes(&self.image_bytes);
        let captured_at = self.captured_at.unwrap_or_else(|| Utc::now().timestamp());

        Observation {
            image_hash,
            image_data: ImageData::Inline(self.image_bytes),
            location: self.location,
            captured_at,
            predictions: self.predictions,
            submitter_ip: self.submitter_ip,
            submitter_id: self.submitter_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prediction(confidence: f64, species: &str) -> SpeciesPrediction {
        SpeciesPrediction {
            confidence,
            species: Some(species.to_string()),
            genus: Some("Quercus".to_string()),
            family: Some("Fagaceae".to_string()),
            common_names: vec!["Common Oak".to_string(), "English Oak".to_string()],
            gbif_id: Some("2878688".to_string()),
            powo_id: Some("295763-1".to_string()),
            iucn_id: None,
            iucn_category: None,
        }
    }

    fn sample_observation() -> Observation {
        ObservationBuilder::new(b"normalized image bytes".to_vec(), "a1b2c3d4")
            .with_location(Some(Location {
                latitude: 48.8566,
                longitude: 2.3522,
                accuracy: Some(12.5),
                source: LocationSource::Exif,
            }))
            .with_captured_at(1_700_000_000)
            .with_predictions(vec![sample_prediction(0.92, "Quercus robur")])
            .with_submitter_ip(Some("203.0.113.7".to_string()))
            .build()
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = ImageHash::from_bytes(b"same bytes");
        let b = ImageHash::from_bytes(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_content_different_hash() {
        let a = ImageHash::from_bytes(b"Content A");
        let b = ImageHash::from_bytes(b"Content B");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_ignores_metadata() {
        let bytes = b"image payload".to_vec();
        let with_location = ObservationBuilder::new(bytes.clone(), "aaaaaaaa")
            .with_location(Some(Location {
                latitude: 1.0,
                longitude: 2.0,
                accuracy: None,
                source: LocationSource::Browser,
            }))
            .build();
        let without = ObservationBuilder::new(bytes, "bbbbbbbb").build();

        assert_eq!(with_location.image_hash, without.image_hash);
    }

    #[test]
    fn test_hash_parse_rejects_bad_shapes() {
        assert!(ImageHash::parse("0123456789abcdef").is_ok());
        assert!(ImageHash::parse("0123456789ABCDEF").is_ok());
        assert!(ImageHash::parse("short").is_err());
        assert!(ImageHash::parse("0123456789abcdeg").is_err());
        assert!(ImageHash::parse("0123456789abcdef0").is_err());
    }

    #[test]
    fn test_json_roundtrip_inline_image() {
        let obs = sample_observation();
        let json = obs.to_json().expect("serialize");
        let restored = Observation::from_json(&json).expect("deserialize");
        assert_eq!(obs, restored);
    }

    #[test]
    fn test_json_roundtrip_url_image() {
        let obs = sample_observation().with_image_url("http://store/images/abc.png");
        let json = obs.to_json().expect("serialize");
        let restored = Observation::from_json(&json).expect("deserialize");
        assert_eq!(obs, restored);
        assert_eq!(
            restored.image_data.as_url(),
            Some("http://store/images/abc.png")
        );
    }

    #[test]
    fn test_inline_image_serializes_as_data_url() {
        let obs = sample_observation();
        let json = obs.to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        let image_field = value["imageData"].as_str().expect("string field");
        assert!(image_field.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_wire_uses_camel_case_keys() {
        let obs = sample_observation();
        let json = obs.to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert!(value.get("imageHash").is_some());
        assert!(value.get("capturedAt").is_some());
        assert!(value.get("submitterId").is_some());
        assert_eq!(value["location"]["source"], "exif");
    }

    #[test]
    fn test_missing_predictions_deserializes_empty() {
        let json = r#"{
            "imageHash": "0123456789abcdef",
            "imageData": "http://store/images/0123456789abcdef.png",
            "capturedAt": 1700000000,
            "submitterId": "a1b2c3d4"
        }"#;
        let obs = Observation::from_json(json).expect("deserialize");
        assert!(obs.predictions.is_empty());
        assert!(obs.location.is_none());
        assert!(obs.submitter_ip.is_none());
    }

    #[test]
    fn test_builder_defaults_captured_at_to_now() {
        let before = Utc::now().timestamp();
        let obs = ObservationBuilder::new(b"x".to_vec(), "a1b2c3d4").build();
        let after = Utc::now().timestamp();
        assert!(obs.captured_at >= before && obs.captured_at <= after);
    }

    #[test]
    fn test_malformed_data_url_rejected() {
        assert!(ImageData::from_wire("data:image/jpeg;base65,oops").is_err());
        assert!(ImageData::from_wire("data:image/jpeg;base64,!!!").is_err());
    }
}
