//! Gallery read handlers
//!
//! Lists stored observations (with resolved image data), raw metadata
//! records, and single photos by hash.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use floralog_core::{image_key, ImageHash, Observation};

use crate::error::ApiError;
use crate::handlers::AppState;

/// Query parameters for listing photos
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPhotosQuery {
    /// Restrict the listing to one submitter identifier
    pub submitter: Option<String>,
}

/// Response for the photo listing
#[derive(Serialize, ToSchema)]
pub struct PhotosResponse {
    pub success: bool,
    /// Observations with image data resolved, newest capture first
    #[schema(value_type = Vec<Object>)]
    pub photos: Vec<Observation>,
    pub count: usize,
}

/// Response for the raw metadata listing
#[derive(Serialize, ToSchema)]
pub struct MetadataResponse {
    pub success: bool,
    /// Metadata records as stored, images referenced by URL
    #[schema(value_type = Vec<Object>)]
    pub metadata: Vec<Observation>,
    pub count: usize,
}

/// Query parameters for a single photo lookup
#[derive(Debug, Deserialize, IntoParams)]
pub struct PhotoQuery {
    /// Content hash of the observation
    pub hash: String,
}

/// One photo in URL form
#[derive(Serialize, ToSchema)]
pub struct PhotoBody {
    /// Content hash of the observation
    #[serde(rename = "imageHash")]
    #[schema(example = "a1b2c3d4e5f60718")]
    pub image_hash: String,
    /// URL the stored image is served from
    #[serde(rename = "imageData")]
    pub image_data: String,
}

/// Response for a single photo lookup
#[derive(Serialize, ToSchema)]
pub struct PhotoResponse {
    pub success: bool,
    pub photo: PhotoBody,
}

/// List stored observations with resolved image data
///
/// Returns every observation visible in the store, sorted by capture
/// time descending. Records whose image is missing or unreachable are
/// dropped from the listing, not fatal.
#[utoipa::path(
    get,
    path = "/photos",
    tag = "Gallery",
    params(ListPhotosQuery),
    responses(
        (status = 200, description = "Stored observations", body = PhotosResponse),
        (status = 500, description = "Store listing failed")
    )
)]
pub async fn list_photos_handler(
    State(state): State<AppState>,
    Query(query): Query<ListPhotosQuery>,
) -> Result<Json<PhotosResponse>, ApiError> {
    let photos = state
        .repository
        .list_all(query.submitter.as_deref())
        .await?;

    let count = photos.len();
    Ok(Json(PhotosResponse {
        success: true,
        photos,
        count,
    }))
}

/// List raw metadata records, pre image-resolution
#[utoipa::path(
    get,
    path = "/metadata",
    tag = "Gallery",
    responses(
        (status = 200, description = "Stored metadata records", body = MetadataResponse),
        (status = 500, description = "Store listing failed")
    )
)]
pub async fn list_metadata_handler(
    State(state): State<AppState>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let metadata = state.repository.list_metadata().await?;

    let count = metadata.len();
    Ok(Json(MetadataResponse {
        success: true,
        metadata,
        count,
    }))
}

/// Look up a single photo by content hash
///
/// Returns the stored image's URL, or 404 when no observation with that
/// hash exists.
#[utoipa::path(
    get,
    path = "/photo",
    tag = "Gallery",
    params(PhotoQuery),
    responses(
        (status = 200, description = "Photo found", body = PhotoResponse),
        (status = 400, description = "Malformed hash"),
        (status = 404, description = "No observation with that hash")
    )
)]
pub async fn get_photo_handler(
    State(state): State<AppState>,
    Query(query): Query<PhotoQuery>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let hash = ImageHash::parse(&query.hash)?;

    let observation = state
        .repository
        .get(&hash)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no observation with hash {}", hash)))?;

    Ok(Json(PhotoResponse {
        success: true,
        photo: PhotoBody {
            image_hash: observation.image_hash.to_string(),
            image_data: state.store.url_for(&image_key(&observation.image_hash)),
        },
    }))
}
