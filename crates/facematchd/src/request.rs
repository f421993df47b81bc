//! Request decoding for `POST /api/compare-faces`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid request data. Need capturedImage and databaseUrls.")]
    MissingFields,
    #[error("Invalid request data: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
#[error("invalid base64 image payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Wire shape. `null` and absent fields both land as `None`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatchRequest {
    captured_image: Option<String>,
    database_urls: Option<Vec<String>>,
}

/// A validated comparison request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    /// Base64 image, possibly prefixed with a data-URI header.
    pub captured_image: String,
    /// Candidates in the order they are tried.
    pub database_urls: Vec<String>,
}

impl MatchRequest {
    /// Parse and validate a raw JSON body.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::MissingFields);
        }

        let raw: Option<RawMatchRequest> =
            serde_json::from_slice(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        match raw {
            Some(RawMatchRequest {
                captured_image: Some(captured_image),
                database_urls: Some(database_urls),
            }) => Ok(Self {
                captured_image,
                database_urls,
            }),
            _ => Err(ValidationError::MissingFields),
        }
    }

    /// Raw bytes of the captured image.
    pub fn decode_captured_image(&self) -> Result<Vec<u8>, DecodeError> {
        decode_base64_image(&self.captured_image)
    }
}

/// Drop everything up to and including the first comma
/// (`data:image/jpeg;base64,` and similar headers).
pub fn strip_data_uri_prefix(payload: &str) -> &str {
    payload.split_once(',').map_or(payload, |(_, data)| data)
}

pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(STANDARD.decode(strip_data_uri_prefix(payload).trim())?)
}
