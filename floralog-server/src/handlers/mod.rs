//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod identify;
pub mod observations;
pub mod photos;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use identify::identify_proxy_handler;
pub use observations::{create_observation_handler, ObservationResponse};
pub use photos::{
    get_photo_handler, list_metadata_handler, list_photos_handler, MetadataResponse, PhotoBody,
    PhotoResponse, PhotosResponse,
};
