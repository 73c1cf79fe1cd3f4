//! # Core Configuration Module
//!
//! Builder-based configuration for the media core.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries the cache location, synchronization pacing, event
//! bus sizing and the transport handed to provider factories. It is built
//! through [`CoreConfigBuilder`], which validates every value in `build()`
//! so that a bad setting fails at startup instead of in the middle of a sync.
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - transport for providers (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is disabled and no client is injected,
//! [`CoreConfig::require_http_client`] reports the missing capability.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/media.db")
//!     .sync_page_delay_ms(500)
//!     .max_page_retries(5)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

const MAX_PAGE_DELAY_MS: u64 = 60_000;
const MAX_RETRY_DELAY_MS: u64 = 300_000;
const MAX_PAGE_RETRIES: u32 = 20;

/// Pacing of library synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Pause between two library pages
    pub page_delay_ms: u64,
    /// Wait before retrying a failed page when the provider gives no hint
    pub retry_delay_ms: u64,
    /// Retries per page before the sync fails
    pub max_page_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_delay_ms: 200,
            retry_delay_ms: 2_000,
            max_page_retries: 3,
        }
    }
}

impl SyncSettings {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_delay_ms > MAX_PAGE_DELAY_MS {
            return Err(Error::Config(
                "Sync page delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if self.retry_delay_ms == 0 {
            return Err(Error::Config(
                "Sync retry delay must be greater than 0ms".to_string(),
            ));
        }

        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(Error::Config(
                "Sync retry delay exceeds maximum of 5 minutes (300,000ms)".to_string(),
            ));
        }

        if self.max_page_retries > MAX_PAGE_RETRIES {
            return Err(Error::Config(format!(
                "Max page retries exceeds maximum of {}",
                MAX_PAGE_RETRIES
            )));
        }

        Ok(())
    }
}

/// Core configuration. Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite file backing the media cache; `None` keeps it in memory
    pub database_path: Option<PathBuf>,

    pub sync: SyncSettings,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Transport handed to provider factories
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path, when set, is not empty
    /// - Sync pacing is within bounds
    /// - Event buffer size is greater than zero
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        self.sync.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured transport, or `CapabilityMissing`.
    pub fn require_http_client(&self) -> Result<Arc<dyn HttpClient>> {
        self.http_client.clone().ok_or_else(http_client_missing_error)
    }
}

fn http_client_missing_error() -> Error {
    Error::capability_missing(
        "HttpClient",
        "HttpClient implementation is required by this provider. \
         Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
         Other hosts: inject a client with CoreConfigBuilder::http_client.",
    )
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    sync: SyncSettings,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite file backing the media cache.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Keeps the media cache in memory.
    pub fn in_memory(mut self) -> Self {
        self.database_path = None;
        self
    }

    pub fn sync_page_delay_ms(mut self, delay_ms: u64) -> Self {
        self.sync.page_delay_ms = delay_ms;
        self
    }

    pub fn sync_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.sync.retry_delay_ms = delay_ms;
        self
    }

    pub fn max_page_retries(mut self, retries: u32) -> Self {
        self.sync.max_page_retries = retries;
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Injects the transport used by provider factories.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value is out of range and
    /// [`Error::Internal`] when the default transport cannot be created.
    pub fn build(self) -> Result<CoreConfig> {
        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database_path: self.database_path,
            sync: self.sync,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};

    struct NullHttpClient;

    #[async_trait]
    impl HttpClient for NullHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 204,
                headers: Default::default(),
                body: Default::default(),
            })
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .build()
            .unwrap();

        assert!(config.database_path.is_none());
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.sync.page_delay(), Duration::from_millis(200));
        assert_eq!(config.sync.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.require_http_client().is_ok());
    }

    #[test]
    fn test_builder_with_custom_settings() {
        let config = CoreConfig::builder()
            .database_path("/tmp/media.db")
            .sync_page_delay_ms(0)
            .sync_retry_delay_ms(50)
            .max_page_retries(7)
            .event_buffer_size(16)
            .http_client(Arc::new(NullHttpClient))
            .build()
            .unwrap();

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/media.db")));
        assert_eq!(config.sync.page_delay_ms, 0);
        assert_eq!(config.sync.retry_delay_ms, 50);
        assert_eq!(config.sync.max_page_retries, 7);
        assert_eq!(config.event_buffer_size, 16);
    }

    #[test]
    fn test_in_memory_clears_path() {
        let config = CoreConfig::builder()
            .database_path("/tmp/media.db")
            .in_memory()
            .http_client(Arc::new(NullHttpClient))
            .build()
            .unwrap();
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let result = CoreConfig::builder()
            .database_path("")
            .http_client(Arc::new(NullHttpClient))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("empty")));
    }

    #[test]
    fn test_validate_rejects_bad_sync_settings() {
        let zero_retry_delay = CoreConfig::builder()
            .sync_retry_delay_ms(0)
            .http_client(Arc::new(NullHttpClient))
            .build();
        assert!(matches!(zero_retry_delay, Err(Error::Config(_))));

        let slow_pages = SyncSettings {
            page_delay_ms: 120_000,
            ..SyncSettings::default()
        };
        assert!(slow_pages.validate().is_err());

        let many_retries = SyncSettings {
            max_page_retries: 100,
            ..SyncSettings::default()
        };
        assert!(many_retries.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = CoreConfig::builder()
            .event_buffer_size(0)
            .http_client(Arc::new(NullHttpClient))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_http_client_is_reported() {
        let config = CoreConfig {
            database_path: None,
            sync: SyncSettings::default(),
            event_buffer_size: 10,
            http_client: None,
        };

        match config.require_http_client() {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder().build().unwrap();
        assert!(config.http_client.is_some());
    }

    #[test]
    fn test_config_debug_hides_client() {
        let config = CoreConfig::builder()
            .http_client(Arc::new(NullHttpClient))
            .build()
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
    }
}
