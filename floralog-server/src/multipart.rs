//! Multipart form parsing helpers
//!
//! Reusable abstraction for parsing multipart/form-data uploads, so the
//! upload-shaped handlers share one validation path.

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::ApiError;
use crate::validation::{validate_content_type, validate_file_size};

/// Represents a file uploaded via multipart form
#[derive(Debug, Clone)]
pub struct FileField {
    /// File data bytes
    pub data: Vec<u8>,
    /// Content-Type from the multipart field (if provided)
    pub content_type: Option<String>,
    /// Original filename from the multipart field (if provided)
    pub file_name: Option<String>,
}

/// Parsed multipart form fields
///
/// Structured access to one file field and the text fields of a
/// multipart/form-data request, with validation applied while reading.
#[derive(Debug)]
pub struct MultipartFields {
    /// The uploaded file, keyed by the handler's chosen field name
    file: Option<FileField>,
    /// Text fields indexed by name
    text_fields: HashMap<String, String>,
}

impl MultipartFields {
    /// Parse all fields from a multipart request.
    ///
    /// `file_field` names the field carrying the upload ("images" for
    /// the identification proxy). Content-Type validation and the size
    /// ceiling apply to that field only.
    pub async fn parse(
        multipart: &mut Multipart,
        file_field: &str,
        validate_content_type_flag: bool,
        max_file_size: usize,
    ) -> Result<Self, ApiError> {
        let mut file: Option<FileField> = None;
        let mut text_fields = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to parse multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();

            if name == file_field {
                let content_type = field.content_type().map(|s| s.to_string());
                let file_name = field.file_name().map(|s| s.to_string());

                if validate_content_type_flag {
                    validate_content_type(content_type.as_deref())?;
                }

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?
                    .to_vec();

                validate_file_size(data.len(), max_file_size)?;

                file = Some(FileField {
                    data,
                    content_type,
                    file_name,
                });
            } else {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field '{}': {}", name, e))
                })?;
                text_fields.insert(name, value);
            }
        }

        Ok(Self { file, text_fields })
    }

    /// Get the file field (required)
    ///
    /// Returns an error if no file was uploaded.
    pub fn require_file(&self) -> Result<&FileField, ApiError> {
        self.file
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("No image provided in the multipart form."))
    }

    /// Get the file field (optional)
    pub fn get_file(&self) -> Option<&FileField> {
        self.file.as_ref()
    }

    /// Get a text field value
    ///
    /// Returns `None` if the field is not present.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.text_fields.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_text() {
        let mut text_fields = HashMap::new();
        text_fields.insert("organs".to_string(), "leaf".to_string());

        let fields = MultipartFields {
            file: None,
            text_fields,
        };

        assert_eq!(fields.get_text("organs"), Some("leaf"));
        assert_eq!(fields.get_text("missing"), None);
    }

    #[test]
    fn test_require_file_missing() {
        let fields = MultipartFields {
            file: None,
            text_fields: HashMap::new(),
        };

        assert!(fields.require_file().is_err());
    }
}
