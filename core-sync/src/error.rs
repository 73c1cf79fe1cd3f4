use core_library::LibraryError;
use core_providers::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No provider exists with name {0}")]
    ProviderNotFound(String),

    #[error("{provider} provider is not logged in")]
    NotLoggedIn { provider: String },

    #[error("{provider} has no user library")]
    NoLibrary { provider: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache error: {0}")]
    Library(#[from] LibraryError),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
