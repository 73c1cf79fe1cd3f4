//! Pacing of library synchronization

use core_runtime::config::SyncSettings;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Pause between two library pages
    pub page_delay: Duration,
    /// Wait before retrying a failed page when the provider gives no hint
    pub retry_delay: Duration,
    /// Retries per page before the sync fails
    pub max_page_retries: u32,
    /// How long `sync:all` keeps a provider failure in its status text
    /// before moving on
    pub failure_pause: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for SyncConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            page_delay: settings.page_delay(),
            retry_delay: settings.retry_delay(),
            max_page_retries: settings.max_page_retries,
            failure_pause: Duration::from_secs(3),
        }
    }
}

impl SyncConfig {
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_page_retries(mut self, retries: u32) -> Self {
        self.max_page_retries = retries;
        self
    }

    pub fn with_failure_pause(mut self, pause: Duration) -> Self {
        self.failure_pause = pause;
        self
    }
}
