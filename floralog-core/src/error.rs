use thiserror::Error;

#[derive(Error, Debug)]
pub enum FloralogError {
    #[error("Image decode error: {0}")]
    DecodeError(String),

    #[error("Image encode error: {0}")]
    EncodeError(String),

    #[error("Identification provider error (status {status}): {body}")]
    ProviderError { status: u16, body: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Local state error: {0}")]
    StateError(String),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FloralogError>;
