//! HTTP species identification client.
//!
//! Talks to the identification relay endpoint, which forwards to the
//! external provider and keeps the provider credential server-side. The
//! client never sees the credential.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{filter_predictions, IdentifyOptions, SpeciesIdentifier};
use crate::error::{FloralogError, Result};
use crate::observation::SpeciesPrediction;

/// Default relay endpoint (the local server's identification proxy).
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/identify";

/// Default timeout for identification requests. Uploads plus provider
/// inference can be slow, so this is looser than the sensor budget.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the HTTP identification client.
#[derive(Debug, Clone)]
pub struct HttpIdentifierConfig {
    /// Relay endpoint URL.
    pub endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for HttpIdentifierConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("FLORALOG_IDENTIFY_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Species identification over the relay endpoint.
pub struct HttpIdentifier {
    client: Client,
    config: HttpIdentifierConfig,
}

impl HttpIdentifier {
    /// Create a client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(HttpIdentifierConfig::default())
    }

    /// Create a client with custom configuration.
    #[instrument(level = "debug", skip_all, fields(
        endpoint = %config.endpoint,
        timeout_ms = config.timeout.as_millis() as u64
    ))]
    pub fn with_config(config: HttpIdentifierConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SpeciesIdentifier for HttpIdentifier {
    #[instrument(level = "info", skip(self, image), fields(
        endpoint = %self.config.endpoint,
        image_bytes = image.len(),
        project = %options.project
    ))]
    async fn identify(
        &self,
        image: &[u8],
        options: &IdentifyOptions,
    ) -> Result<Vec<SpeciesPrediction>> {
        let start = Instant::now();

        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("observation.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| FloralogError::SerializationError(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("images", part)
            .text("organs", options.organs.clone());

        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[("project", options.project.as_str())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(status = %status, latency_ms, "identification response received");

        if status == StatusCode::NOT_FOUND {
            info!(latency_ms, "no species identifiable for this image");
            return Ok(Vec::new());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, latency_ms, "identification provider error");
            return Err(FloralogError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        let provider: ProviderResponse = response.json().await.map_err(|e| {
            FloralogError::SerializationError(format!(
                "malformed identification response: {}",
                e
            ))
        })?;

        let mapped: Vec<SpeciesPrediction> = provider
            .results
            .into_iter()
            .map(map_candidate)
            .collect();
        let filtered = filter_predictions(mapped, options.min_confidence);

        info!(
            latency_ms,
            candidates = filtered.len(),
            "identification completed"
        );
        Ok(filtered)
    }
}

/// Provider response envelope.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    results: Vec<ProviderCandidate>,
}

#[derive(Debug, Deserialize)]
struct ProviderCandidate {
    score: f64,
    species: Option<ProviderSpecies>,
    gbif: Option<ProviderRef>,
    powo: Option<ProviderRef>,
    iucn: Option<ProviderIucn>,
}

#[derive(Debug, Deserialize)]
struct ProviderSpecies {
    #[serde(rename = "scientificNameWithoutAuthor")]
    scientific_name: Option<String>,
    genus: Option<ProviderTaxon>,
    family: Option<ProviderTaxon>,
    #[serde(rename = "commonNames", default)]
    common_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderTaxon {
    #[serde(rename = "scientificNameWithoutAuthor")]
    scientific_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderRef {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProviderIucn {
    id: Option<serde_json::Value>,
    category: Option<String>,
}

fn map_candidate(candidate: ProviderCandidate) -> SpeciesPrediction {
    let species = candidate.species;
    SpeciesPrediction {
        confidence: candidate.score,
        species: species
            .as_ref()
            .and_then(|s| s.scientific_name.clone()),
        genus: species
            .as_ref()
            .and_then(|s| s.genus.as_ref())
            .and_then(|g| g.scientific_name.clone()),
        family: species
            .as_ref()
            .and_then(|s| s.family.as_ref())
            .and_then(|f| f.scientific_name.clone()),
        common_names: species.map(|s| s.common_names).unwrap_or_default(),
        gbif_id: candidate.gbif.and_then(|r| id_string(r.id)),
        powo_id: candidate.powo.and_then(|r| id_string(r.id)),
        iucn_id: candidate.iucn.as_ref().and_then(|i| id_string(i.id.clone())),
        iucn_category: candidate.iucn.and_then(|i| i.category),
    }
}

/// Cross-reference ids arrive as numbers or strings depending on the
/// registry.
fn id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "results": [
            {
                "score": 0.91,
                "species": {
                    "scientificNameWithoutAuthor": "Quercus robur",
                    "genus": { "scientificNameWithoutAuthor": "Quercus" },
                    "family": { "scientificNameWithoutAuthor": "Fagaceae" },
                    "commonNames": ["Common Oak", "Pedunculate Oak"]
                },
                "gbif": { "id": "2878688" },
                "powo": { "id": "295763-1" },
                "iucn": { "id": 63532, "category": "LC" }
            },
            {
                "score": 0.03,
                "species": {
                    "scientificNameWithoutAuthor": "Quercus petraea",
                    "genus": { "scientificNameWithoutAuthor": "Quercus" },
                    "family": { "scientificNameWithoutAuthor": "Fagaceae" },
                    "commonNames": []
                },
                "gbif": { "id": 2878687 },
                "powo": null,
                "iucn": null
            }
        ]
    }"#;

    #[test]
    fn test_default_config() {
        let config = HttpIdentifierConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.endpoint.contains("/identify"));
    }

    #[test]
    fn test_create_client() {
        assert!(HttpIdentifier::new().is_ok());
    }

    #[test]
    fn test_candidate_mapping_from_fixture() {
        let parsed: ProviderResponse = serde_json::from_str(FIXTURE).expect("parse fixture");
        let mapped: Vec<SpeciesPrediction> =
            parsed.results.into_iter().map(map_candidate).collect();

        assert_eq!(mapped.len(), 2);
        let first = &mapped[0];
        assert_eq!(first.confidence, 0.91);
        assert_eq!(first.species.as_deref(), Some("Quercus robur"));
        assert_eq!(first.genus.as_deref(), Some("Quercus"));
        assert_eq!(first.family.as_deref(), Some("Fagaceae"));
        assert_eq!(first.common_names.len(), 2);
        assert_eq!(first.gbif_id.as_deref(), Some("2878688"));
        assert_eq!(first.powo_id.as_deref(), Some("295763-1"));
        assert_eq!(first.iucn_id.as_deref(), Some("63532"));
        assert_eq!(first.iucn_category.as_deref(), Some("LC"));
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let parsed: ProviderResponse = serde_json::from_str(FIXTURE).expect("parse fixture");
        let second = map_candidate(parsed.results.into_iter().nth(1).expect("second"));
        assert_eq!(second.gbif_id.as_deref(), Some("2878687"));
        assert!(second.powo_id.is_none());
        assert!(second.iucn_category.is_none());
    }

    #[test]
    fn test_mapping_then_filter_applies_floor() {
        let parsed: ProviderResponse = serde_json::from_str(FIXTURE).expect("parse fixture");
        let mapped: Vec<SpeciesPrediction> =
            parsed.results.into_iter().map(map_candidate).collect();
        let filtered = filter_predictions(mapped, 0.05);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].species.as_deref(), Some("Quercus robur"));
    }

    #[test]
    fn test_empty_results_parse() {
        let parsed: ProviderResponse = serde_json::from_str(r#"{"results": []}"#).expect("parse");
        assert!(parsed.results.is_empty());

        let parsed: ProviderResponse = serde_json::from_str(r#"{}"#).expect("parse");
        assert!(parsed.results.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a running identification relay"]
    async fn test_identify_against_live_relay() {
        let identifier = HttpIdentifier::new().unwrap();
        let result = identifier
            .identify(&[0xFF, 0xD8, 0xFF, 0xE0], &IdentifyOptions::default())
            .await;
        println!("live identify result: {:?}", result);
    }
}
