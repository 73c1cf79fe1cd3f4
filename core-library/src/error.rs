use core_media::MediaError;
use thiserror::Error;

/// Media cache errors
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store could not be created or opened. The instance is unusable.
    #[error("Failed to open media cache at {location}: {message}")]
    Open { location: String, message: String },

    /// The cache is closed, or its worker stopped.
    #[error("Media cache is closed")]
    Closed,

    /// A stored row could not be turned back into canonical JSON.
    #[error("Failed to decode {table} row: {message}")]
    Decode { table: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with uri {uri}")]
    NotFound { entity_type: String, uri: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },
}

impl LibraryError {
    pub(crate) fn decode(table: &str, message: impl Into<String>) -> Self {
        LibraryError::Decode {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        LibraryError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the instance must be re-opened before further use.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LibraryError::Open { .. } | LibraryError::Closed)
    }
}

impl From<MediaError> for LibraryError {
    fn from(err: MediaError) -> Self {
        LibraryError::InvalidInput {
            field: "item".to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
