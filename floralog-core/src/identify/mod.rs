//! Species identification providers.
//!
//! The pipeline treats "submit an image, get ranked predictions" as a
//! single capability behind one trait, regardless of whether the
//! credential-holding hop is in-process or a separate network relay.
//!
//! - **HTTP** - posts the image to the identification relay endpoint,
//!   which injects the provider credential server-side
//! - **Mock** - deterministic fixtures for tests and offline use
//!
//! A provider 404 means "no species identifiable" and maps to the empty
//! prediction list; it is never surfaced as a transport failure.

mod http;
mod mock;

pub use http::{HttpIdentifier, HttpIdentifierConfig};
pub use mock::MockIdentifier;

use async_trait::async_trait;

use crate::error::Result;
use crate::observation::SpeciesPrediction;

/// Confidence below which candidates are dropped from results.
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.05;

/// Request options forwarded to the identification provider.
#[derive(Debug, Clone)]
pub struct IdentifyOptions {
    /// Plant organ hint ("auto" lets the provider decide).
    pub organs: String,
    /// Provider project/flora scope.
    pub project: String,
    /// Minimum confidence kept in the filtered result.
    pub min_confidence: f64,
}

impl Default for IdentifyOptions {
    fn default() -> Self {
        Self {
            organs: "auto".to_string(),
            project: "all".to_string(),
            min_confidence: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

/// A species identification capability.
///
/// Implementations must be thread-safe (`Send + Sync`). One attempt per
/// call; retry policy belongs to the caller, and the contract here is a
/// single shot.
#[async_trait]
pub trait SpeciesIdentifier: Send + Sync {
    /// Identify the species in a normalized image.
    ///
    /// Returns candidates in provider order (descending confidence),
    /// already filtered to `options.min_confidence`. An empty list is a
    /// valid "no match" outcome, distinct from an `Err` transport
    /// failure.
    async fn identify(
        &self,
        image: &[u8],
        options: &IdentifyOptions,
    ) -> Result<Vec<SpeciesPrediction>>;
}

/// Drop candidates below the confidence floor, preserving provider order.
pub fn filter_predictions(
    predictions: Vec<SpeciesPrediction>,
    min_confidence: f64,
) -> Vec<SpeciesPrediction> {
    predictions
        .into_iter()
        .filter(|p| p.confidence >= min_confidence)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(confidence: f64) -> SpeciesPrediction {
        SpeciesPrediction {
            confidence,
            species: None,
            genus: None,
            family: None,
            common_names: Vec::new(),
            gbif_id: None,
            powo_id: None,
            iucn_id: None,
            iucn_category: None,
        }
    }

    #[test]
    fn test_filter_drops_below_floor_preserving_order() {
        let input = vec![
            prediction(0.9),
            prediction(0.2),
            prediction(0.03),
            prediction(0.05),
        ];
        let filtered = filter_predictions(input, DEFAULT_CONFIDENCE_FLOOR);

        let scores: Vec<f64> = filtered.iter().map(|p| p.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.2, 0.05]);
    }

    #[test]
    fn test_filter_keeps_exact_floor_value() {
        let filtered = filter_predictions(vec![prediction(0.05)], 0.05);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_filter_all_below_floor_is_empty() {
        let filtered = filter_predictions(vec![prediction(0.01), prediction(0.02)], 0.05);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_default_options() {
        let options = IdentifyOptions::default();
        assert_eq!(options.organs, "auto");
        assert_eq!(options.project, "all");
        assert_eq!(options.min_confidence, 0.05);
    }
}
