//! Mock species identifier for tests and offline operation.

use async_trait::async_trait;

use super::{filter_predictions, IdentifyOptions, SpeciesIdentifier};
use crate::error::{FloralogError, Result};
use crate::observation::SpeciesPrediction;

/// Deterministic identifier that answers from a fixed candidate list.
pub struct MockIdentifier {
    predictions: Vec<SpeciesPrediction>,
    fail_with: Option<(u16, String)>,
}

impl MockIdentifier {
    /// Mock with a plausible two-candidate fixture.
    pub fn new() -> Self {
        Self {
            predictions: vec![
                fixture("Quercus robur", "Quercus", "Fagaceae", 0.87),
                fixture("Quercus petraea", "Quercus", "Fagaceae", 0.09),
            ],
            fail_with: None,
        }
    }

    /// Mock answering with the given candidates, in the given order.
    pub fn with_predictions(predictions: Vec<SpeciesPrediction>) -> Self {
        Self {
            predictions,
            fail_with: None,
        }
    }

    /// Mock with no identifiable species.
    pub fn empty() -> Self {
        Self::with_predictions(Vec::new())
    }

    /// Mock that fails every call with a provider error.
    pub fn failing(status: u16, body: impl Into<String>) -> Self {
        Self {
            predictions: Vec::new(),
            fail_with: Some((status, body.into())),
        }
    }
}

impl Default for MockIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeciesIdentifier for MockIdentifier {
    async fn identify(
        &self,
        _image: &[u8],
        options: &IdentifyOptions,
    ) -> Result<Vec<SpeciesPrediction>> {
        if let Some((status, body)) = &self.fail_with {
            return Err(FloralogError::ProviderError {
                status: *status,
                body: body.clone(),
            });
        }
        Ok(filter_predictions(
            self.predictions.clone(),
            options.min_confidence,
        ))
    }
}

fn fixture(species: &str, genus: &str, family: &str, confidence: f64) -> SpeciesPrediction {
    SpeciesPrediction {
        confidence,
        species: Some(species.to_string()),
        genus: Some(genus.to_string()),
        family: Some(family.to_string()),
        common_names: Vec::new(),
        gbif_id: None,
        powo_id: None,
        iucn_id: None,
        iucn_category: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let identifier = MockIdentifier::new();
        let options = IdentifyOptions::default();

        let a = identifier.identify(b"img", &options).await.unwrap();
        let b = identifier.identify(b"img", &options).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_applies_confidence_floor() {
        let identifier = MockIdentifier::new();
        let options = IdentifyOptions {
            min_confidence: 0.5,
            ..IdentifyOptions::default()
        };

        let predictions = identifier.identify(b"img", &options).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].species.as_deref(), Some("Quercus robur"));
    }

    #[tokio::test]
    async fn test_empty_mock_yields_no_match() {
        let identifier = MockIdentifier::empty();
        let predictions = identifier
            .identify(b"img", &IdentifyOptions::default())
            .await
            .unwrap();
        assert!(predictions.is_empty());
    }

    #[tokio::test]
    async fn test_failing_mock_surfaces_provider_error() {
        let identifier = MockIdentifier::failing(503, "upstream down");
        let err = identifier
            .identify(b"img", &IdentifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FloralogError::ProviderError { status: 503, .. }
        ));
    }
}
