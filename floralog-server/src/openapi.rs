//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 specification for the Floralog API.

use utoipa::OpenApi;

use crate::handlers::{
    HealthResponse, MetadataResponse, ObservationResponse, PhotoBody, PhotoResponse,
    PhotosResponse, ReadyResponse,
};

/// Floralog API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Floralog API",
        version = "0.1.0",
        description = r#"
## Plant Observation API

Floralog catalogues plant sightings. Each observation carries a
content-addressed photo, the best-available capture location with its
provenance, a ranked list of species predictions, and submitter
metadata.

### How It Works

1. **Submit** an observation via `POST /observations` (image inline as a data URL)
2. The content hash dedupes resubmissions: a known hash answers `409 duplicate`
3. **Browse** the gallery via `GET /photos` (images resolved) or `GET /metadata` (raw records)
4. **Identify** a species via `POST /identify` - the server relays to the
   external provider and keeps the provider credential to itself
"#,
        license(
            name = "MIT OR Apache-2.0",
            url = "https://github.com/floralog/floralog/blob/main/LICENSE"
        ),
        contact(
            name = "Floralog Team",
            url = "https://github.com/floralog/floralog"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Gallery", description = "List and fetch stored observations"),
        (name = "Observations", description = "Submit observations for durable storage"),
        (name = "Identification", description = "Species identification relay with server-side credential"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::photos::list_photos_handler,
        crate::handlers::photos::list_metadata_handler,
        crate::handlers::photos::get_photo_handler,
        crate::handlers::observations::create_observation_handler,
        crate::handlers::identify::identify_proxy_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            PhotosResponse,
            MetadataResponse,
            PhotoResponse,
            PhotoBody,
            ObservationResponse,
        )
    )
)]
pub struct ApiDoc;
