//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured
//! error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use floralog_core::FloralogError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not found - requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate submission - the content hash already exists.
    /// A first-class outcome, mapped to 409 so the UI can say
    /// "already recorded" instead of showing a generic failure.
    #[error("Duplicate observation: {0}")]
    Duplicate(String),

    /// Request timeout - operation took too long
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Floralog core error - error from the pipeline library
    #[error("Pipeline error: {0}")]
    Floralog(#[from] FloralogError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a duplicate-submission error
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Floralog(ref e) => match e {
                // Client-provided invalid input → 400
                FloralogError::DecodeError(_)
                | FloralogError::SerializationError(_)
                | FloralogError::InvalidObservation(_) => StatusCode::BAD_REQUEST,

                // Identification provider failures → 502
                FloralogError::ProviderError { .. } => StatusCode::BAD_GATEWAY,

                // Transport failures to external services → 503
                FloralogError::HttpError(_) => StatusCode::SERVICE_UNAVAILABLE,

                // Store and internal processing failures → 500
                FloralogError::EncodeError(_)
                | FloralogError::StoreError(_)
                | FloralogError::StateError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Duplicate(_) => "duplicate",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Floralog(ref e) => match e {
                FloralogError::DecodeError(_) => "DECODE_ERROR",
                FloralogError::EncodeError(_) => "ENCODE_ERROR",
                FloralogError::ProviderError { .. } => "PROVIDER_ERROR",
                FloralogError::StoreError(_) => "STORE_ERROR",
                FloralogError::SerializationError(_) => "SERIALIZATION_ERROR",
                FloralogError::InvalidObservation(_) => "INVALID_OBSERVATION",
                FloralogError::StateError(_) => "STATE_ERROR",
                FloralogError::HttpError(_) => "UPSTREAM_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Clients branch on the literal string; the descriptive
            // message goes to the logs only.
            Self::Duplicate(_) => "duplicate".to_string(),
            Self::Floralog(ref e) => match e {
                FloralogError::DecodeError(_) => {
                    "Image could not be decoded (corrupt or unsupported format)".to_string()
                }
                FloralogError::EncodeError(_) => "Image re-encoding failed".to_string(),
                FloralogError::ProviderError { status, .. } => {
                    format!("Identification provider error (status {})", status)
                }
                FloralogError::StoreError(_) => {
                    "Storage write failed; please retry the submission".to_string()
                }
                FloralogError::SerializationError(_) => "Malformed observation data".to_string(),
                FloralogError::InvalidObservation(_) => e.to_string(),
                FloralogError::StateError(_) => "Local state error".to_string(),
                FloralogError::HttpError(_) => "Upstream service unreachable".to_string(),
            },
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Duplicate(_) => "duplicate",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Floralog(_) => "pipeline",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        match &self {
            Self::BadRequest(_) | Self::NotFound(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Client error"
                );
            }
            // Duplicates are an expected outcome, not worth a warning.
            Self::Duplicate(_) => {
                tracing::info!(status = %status, error = %internal_message, "Duplicate submission");
            }
            Self::ServiceUnavailable(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Service unavailable"
                );
            }
            Self::Timeout(_) | Self::Internal(_) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Server error"
                );
            }
            Self::Floralog(_) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    client_message = %client_message,
                    "Pipeline error (internal details logged)"
                );
            }
        }

        // All error responses carry success:false and a code for
        // programmatic handling
        let body = serde_json::json!({
            "success": false,
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::duplicate("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(FloralogError::DecodeError("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(FloralogError::ProviderError {
                status: 500,
                body: String::new()
            })
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(FloralogError::StoreError("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_duplicate_error_code_matches_wire_contract() {
        assert_eq!(ApiError::duplicate("seen before").error_code(), "duplicate");
    }

    #[test]
    fn test_duplicate_client_message_is_literal() {
        // The descriptive text stays in the logs; the wire carries the
        // bare word in both error and code fields.
        let err = ApiError::duplicate("observation a1b2c3d4e5f60718 already recorded");
        assert_eq!(err.client_message(), "duplicate");
        assert_eq!(err.error_code(), "duplicate");
    }
}
