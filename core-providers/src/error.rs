//! Error types for media providers

use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use core_media::MediaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable classification of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderErrorCode {
    RateLimited,
    NeedsPremium,
    BadCredentials,
    NotLoggedIn,
    NotSupported,
    NotFound,
    BadData,
    Unknown,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorCode::RateLimited => "rateLimited",
            ProviderErrorCode::NeedsPremium => "needsPremium",
            ProviderErrorCode::BadCredentials => "badCredentials",
            ProviderErrorCode::NotLoggedIn => "notLoggedIn",
            ProviderErrorCode::NotSupported => "notSupported",
            ProviderErrorCode::NotFound => "notFound",
            ProviderErrorCode::BadData => "badData",
            ProviderErrorCode::Unknown => "unknown",
        }
    }

    /// Map an HTTP status onto a code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ProviderErrorCode::BadCredentials,
            402 | 403 => ProviderErrorCode::NeedsPremium,
            404 | 410 => ProviderErrorCode::NotFound,
            422 => ProviderErrorCode::BadData,
            429 => ProviderErrorCode::RateLimited,
            _ => ProviderErrorCode::Unknown,
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Malformed descriptor, unknown provider or unrecognized type
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend failure, classified
    #[error("{provider} error ({code}): {message}")]
    Provider {
        provider: String,
        code: ProviderErrorCode,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Failure of the transport collaborator
    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        code: ProviderErrorCode,
        message: impl Into<String>,
    ) -> Self {
        ProviderError::Provider {
            provider: provider.into(),
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_supported(provider: impl Into<String>, operation: &str) -> Self {
        Self::new(
            provider,
            ProviderErrorCode::NotSupported,
            format!("{} is not supported", operation),
        )
    }

    pub fn not_logged_in(provider: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorCode::NotLoggedIn, "not logged in")
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        ProviderError::Provider {
            provider: provider.into(),
            code: ProviderErrorCode::RateLimited,
            message: "rate limit exceeded".to_string(),
            retry_after,
        }
    }

    /// Classify a non-success response.
    pub fn from_response(provider: impl Into<String>, response: &HttpResponse) -> Self {
        let message = response
            .text()
            .ok()
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {}", response.status));

        ProviderError::Provider {
            provider: provider.into(),
            code: ProviderErrorCode::from_status(response.status),
            message,
            retry_after: response.retry_after(),
        }
    }

    pub fn code(&self) -> Option<ProviderErrorCode> {
        match self {
            ProviderError::Provider { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Server-requested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Rate limits, unclassified backend failures and transient transport
    /// errors may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::InvalidArgument(_) => false,
            ProviderError::Provider { code, .. } => {
                matches!(code, ProviderErrorCode::RateLimited | ProviderErrorCode::Unknown)
            }
            ProviderError::Transport(err) => err.is_transient(),
        }
    }
}

impl From<MediaError> for ProviderError {
    fn from(err: MediaError) -> Self {
        ProviderError::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
