use thiserror::Error;

/// Errors raised while decoding URIs or media payloads.
///
/// All variants are caller errors and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Unknown media type: {0}")]
    UnknownType(String),

    #[error("Invalid media item: {0}")]
    InvalidItem(String),
}

impl MediaError {
    pub(crate) fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        MediaError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MediaError {
    fn from(err: serde_json::Error) -> Self {
        MediaError::InvalidItem(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
