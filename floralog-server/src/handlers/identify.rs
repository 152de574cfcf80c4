//! Identification proxy handler
//!
//! Relays identification requests to the external species-ID provider,
//! injecting the provider credential server-side so it never reaches the
//! client. The provider's JSON body is passed through verbatim,
//! including the 404 no-match case the pipeline treats as benign.

use axum::{
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::multipart::MultipartFields;

/// Query parameters for an identification request
#[derive(Debug, Deserialize, IntoParams)]
pub struct IdentifyQuery {
    /// Provider project/flora scope (default "all")
    pub project: Option<String>,
}

/// Relay an identification request to the species-ID provider
///
/// Accepts multipart/form-data with:
/// - **images** (required): the image to identify
/// - **organs** (optional): plant organ hint, default "auto"
#[utoipa::path(
    post,
    path = "/identify",
    tag = "Identification",
    params(IdentifyQuery),
    request_body(
        content_type = "multipart/form-data",
        description = "Image to identify plus optional organs hint"
    ),
    responses(
        (status = 200, description = "Provider response, passed through verbatim"),
        (status = 400, description = "Missing or invalid image field"),
        (status = 404, description = "Provider found no identifiable species (passed through)"),
        (status = 502, description = "Provider returned an error"),
        (status = 503, description = "No identification provider configured")
    )
)]
#[instrument(level = "info", skip_all)]
pub async fn identify_proxy_handler(
    State(state): State<AppState>,
    Query(query): Query<IdentifyQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let proxy = state
        .identify_proxy
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("identification provider not configured"))?
        .clone();

    let fields = MultipartFields::parse(
        &mut multipart,
        "images",
        true,
        crate::validation::DEFAULT_MAX_FILE_SIZE,
    )
    .await?;
    let image = fields.require_file()?;
    let organs = fields.get_text("organs").unwrap_or("auto").to_string();
    let project = query.project.as_deref().unwrap_or("all");

    let file_name = image
        .file_name
        .clone()
        .unwrap_or_else(|| "observation.jpg".to_string());
    let mime = image
        .content_type
        .clone()
        .unwrap_or_else(|| "image/jpeg".to_string());
    let part = reqwest::multipart::Part::bytes(image.data.clone())
        .file_name(file_name)
        .mime_str(&mime)
        .map_err(|e| ApiError::bad_request(format!("invalid image content type: {}", e)))?;
    let form = reqwest::multipart::Form::new()
        .part("images", part)
        .text("organs", organs);

    // Credential goes on the outbound hop only.
    let url = format!("{}/{}", proxy.provider_url.trim_end_matches('/'), project);
    let response = reqwest::Client::new()
        .post(&url)
        .query(&[("api-key", proxy.api_key.as_str())])
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "identification provider unreachable");
            ApiError::service_unavailable("identification provider unreachable")
        })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|e| {
        warn!(error = %e, "failed reading provider response");
        ApiError::internal("failed reading provider response")
    })?;

    info!(status = %status, bytes = body.len(), project, "provider response relayed");

    // Verbatim pass-through: status and JSON body are the provider's own.
    Ok((
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
