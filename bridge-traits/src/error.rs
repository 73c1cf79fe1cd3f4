use thiserror::Error;

/// Failures of a host collaborator.
///
/// A non-success HTTP status is not a `BridgeError`: the exchange worked and
/// the provider decides what the status means.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    /// The request could not be built or sent as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection refused or reset, TLS failure, undecodable response
    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_) | BridgeError::OperationFailed(_) | BridgeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
