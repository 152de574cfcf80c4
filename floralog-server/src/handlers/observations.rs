//! Observation submission handler
//!
//! Handles POST /observations requests: deserialize the record, probe
//! for duplicates, and perform the two-part write through the gateway.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use floralog_core::Observation;

use crate::error::ApiError;
use crate::handlers::AppState;

/// Response for a stored observation
#[derive(Serialize, ToSchema)]
pub struct ObservationResponse {
    pub success: bool,
    /// Canonical record URL (the metadata object)
    #[schema(example = "https://store.example/metadata/a1b2c3d4e5f60718.json")]
    pub url: String,
    /// URL of the stored image object
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    /// URL of the stored metadata object
    #[serde(rename = "metadataUrl")]
    pub metadata_url: String,
}

/// Submit an observation for durable storage
///
/// Body is a serialized observation carrying its image inline as a data
/// URL. Returns 201 on create and 409 when the content hash already
/// exists (a duplicate is a first-class outcome, not a failure).
#[utoipa::path(
    post,
    path = "/observations",
    tag = "Observations",
    request_body(
        content_type = "application/json",
        description = "Serialized observation with inline image data"
    ),
    responses(
        (status = 201, description = "Observation stored", body = ObservationResponse),
        (status = 400, description = "Malformed observation or image not inline"),
        (status = 409, description = "Content hash already recorded"),
        (status = 500, description = "Store write failed")
    )
)]
pub async fn create_observation_handler(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ObservationResponse>), ApiError> {
    let observation = Observation::from_json(&body)?;

    if !observation.image_data.is_inline() {
        return Err(ApiError::bad_request(
            "observation must carry inline image data for submission",
        ));
    }

    let outcome = state.gateway.save(&observation).await?;

    if outcome.duplicate {
        return Err(ApiError::duplicate(format!(
            "observation {} already recorded",
            observation.image_hash
        )));
    }

    tracing::info!(
        hash = %observation.image_hash,
        submitter = %observation.submitter_id,
        predictions = observation.predictions.len(),
        "observation stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(ObservationResponse {
            success: true,
            url: outcome.metadata_url.clone(),
            image_url: outcome.image_url,
            metadata_url: outcome.metadata_url,
        }),
    ))
}
