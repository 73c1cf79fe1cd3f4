//! # Library Synchronizer
//!
//! Copies each provider's saved library into the media cache, one tracked
//! task per provider.
//!
//! ## Overview
//!
//! [`LibrarySynchronizer::synchronize_library`] starts (or joins) the task
//! named `sync:<provider>`. The task pulls pages from the provider's
//! [`LibrarySource`] and writes each page with
//! [`MediaCache::cache_library_items`], stamping the provider's resume cursor
//! under `syncResumeData_<provider>` in the same transaction. An interrupted
//! sync therefore resumes from the last committed page.
//!
//! [`LibrarySynchronizer::synchronize_all_libraries`] runs `sync:all` on a
//! separate queue. It syncs every provider with a library in turn and carries
//! on past individual failures.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{LibrarySynchronizer, SyncConfig};
//!
//! let synchronizer = LibrarySynchronizer::new(registry, cache, SyncConfig::default());
//! let task = synchronizer.synchronize_library("spotify")?;
//! let outcome = task.wait().await;
//! ```

use crate::config::SyncConfig;
use crate::{Result, SyncError};
use core_library::{CacheOptions, MediaCache};
use core_providers::{LibraryPage, LibrarySource, MediaProvider, ProviderRegistry};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_tasks::{Task, TaskOutcome, TaskQueue};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Name and tag of the task that syncs every provider.
pub const SYNC_ALL_TASK: &str = "sync:all";

/// Name and tag of the task syncing `provider`.
pub fn sync_task_name(provider: &str) -> String {
    format!("sync:{provider}")
}

/// `DBState` key holding `provider`'s resume cursor.
pub fn resume_state_key(provider: &str) -> String {
    format!("syncResumeData_{provider}")
}

/// Drives library synchronization through two task queues
#[derive(Clone)]
pub struct LibrarySynchronizer {
    registry: Arc<ProviderRegistry>,
    cache: Arc<MediaCache>,
    config: SyncConfig,
    queue: TaskQueue,
    all_queue: TaskQueue,
    events: Option<EventBus>,
}

impl LibrarySynchronizer {
    pub fn new(registry: Arc<ProviderRegistry>, cache: Arc<MediaCache>, config: SyncConfig) -> Self {
        Self {
            registry,
            cache,
            config,
            queue: TaskQueue::new(),
            all_queue: TaskQueue::new(),
            events: None,
        }
    }

    /// Publish sync and task events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.queue = TaskQueue::with_event_bus(bus.clone());
        self.all_queue = TaskQueue::with_event_bus(bus.clone());
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Queue holding the per-provider `sync:<provider>` tasks.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }

    // ========================================================================
    // Single provider
    // ========================================================================

    /// Start syncing `provider_name`'s library, or return the sync already
    /// queued for it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ProviderNotFound` when no provider has that name.
    /// Login and library checks happen inside the task and fail it.
    #[instrument(skip(self))]
    pub fn synchronize_library(&self, provider_name: &str) -> Result<Task> {
        let provider = self
            .registry
            .by_name(provider_name)
            .ok_or_else(|| SyncError::ProviderNotFound(provider_name.to_string()))?;
        Ok(self.start_provider_sync(provider))
    }

    fn start_provider_sync(&self, provider: Arc<dyn MediaProvider>) -> Task {
        let name = sync_task_name(provider.name());
        let synchronizer = self.clone();
        self.queue
            .enqueue_unique(name.clone(), name, move |task| async move {
                synchronizer.run_provider_sync(provider, task).await
            })
            .into_task()
    }

    async fn run_provider_sync(&self, provider: Arc<dyn MediaProvider>, task: Task) -> Result<()> {
        let name = provider.name().to_string();
        let started = Instant::now();
        let mut items_cached = 0u64;

        let result = self
            .sync_pages(provider.as_ref(), &task, &mut items_cached)
            .await;

        match &result {
            Ok(()) => {
                info!(provider = %name, items_cached, "Library sync completed");
                self.emit(SyncEvent::Completed {
                    provider: name,
                    items_cached,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            Err(e) if e.is_cancelled() || task.is_cancelled() => {
                info!(provider = %name, items_cached, "Library sync cancelled");
                self.emit(SyncEvent::Cancelled {
                    provider: name,
                    items_cached,
                });
            }
            Err(e) => {
                warn!(provider = %name, error = %e, "Library sync failed");
                task.set_status_text(format!("Error: {e}"));
                self.emit(SyncEvent::Failed {
                    provider: name,
                    message: e.to_string(),
                    items_cached,
                });
            }
        }
        result
    }

    async fn sync_pages(
        &self,
        provider: &dyn MediaProvider,
        task: &Task,
        items_cached: &mut u64,
    ) -> Result<()> {
        let name = provider.name();
        let display_name = provider.display_name();

        if let Some(auth) = provider.auth() {
            if !auth.is_logged_in() {
                return Err(SyncError::NotLoggedIn {
                    provider: display_name.to_string(),
                });
            }
        }
        let source = provider
            .library()
            .filter(|source| source.has_library())
            .ok_or_else(|| SyncError::NoLibrary {
                provider: display_name.to_string(),
            })?;

        self.emit(SyncEvent::Started {
            provider: name.to_string(),
        });
        task.set_status(0.0, format!("Checking {display_name} library sync state"));

        let state_key = resume_state_key(name);
        let mut resume_data = self.load_resume_data(&state_key).await?;

        loop {
            if task.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            task.set_status_text(format!("Synchronizing {display_name} library"));

            let page = self.fetch_page(source, task, resume_data.clone()).await?;
            let stamp = page
                .resume_data
                .as_ref()
                .map_or_else(|| "null".to_string(), Value::to_string);
            self.cache
                .cache_library_items(&page.items, CacheOptions::new().with_state(&state_key, stamp))
                .await?;

            *items_cached += page.items.len() as u64;
            task.set_progress(page.progress);
            debug!(provider = %name, items = page.items.len(), progress = page.progress, "Library page cached");
            self.emit(SyncEvent::Progress {
                provider: name.to_string(),
                progress: page.progress,
                items_cached: *items_cached,
            });

            if page.done {
                break;
            }
            resume_data = page.resume_data;
            self.pause(task, self.config.page_delay).await?;
        }

        task.set_status(1.0, format!("Finished synchronizing {display_name} library"));
        Ok(())
    }

    /// Saved cursor for `state_key`. A missing, null or unreadable cursor
    /// starts the library over.
    async fn load_resume_data(&self, state_key: &str) -> Result<Option<Value>> {
        let stored = self.cache.get_state_value(state_key, "").await?;
        if stored.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&stored) {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = state_key, error = %e, "Discarding unreadable resume data");
                Ok(None)
            }
        }
    }

    async fn fetch_page(
        &self,
        source: &dyn LibrarySource,
        task: &Task,
        resume_data: Option<Value>,
    ) -> Result<LibraryPage> {
        let mut attempt = 0u32;
        loop {
            let fetched = tokio::select! {
                _ = task.cancelled() => return Err(SyncError::Cancelled),
                fetched = source.fetch_library_page(resume_data.clone()) => fetched,
            };
            match fetched {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.config.max_page_retries => {
                    attempt += 1;
                    let delay = e.retry_after().unwrap_or(self.config.retry_delay);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Library page fetch failed, retrying");
                    task.set_status_text(format!("Error: {e}"));
                    self.pause(task, delay).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sleep for `delay`, waking early with `Cancelled` if the task is
    /// cancelled meanwhile.
    async fn pause(&self, task: &Task, delay: Duration) -> Result<()> {
        if task.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        tokio::select! {
            _ = task.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    // ========================================================================
    // All providers
    // ========================================================================

    /// Start `sync:all`, or return it if it is already queued.
    pub fn synchronize_all_libraries(&self) -> Task {
        let synchronizer = self.clone();
        self.all_queue
            .enqueue_unique(SYNC_ALL_TASK, SYNC_ALL_TASK, move |task| async move {
                synchronizer.run_all(task).await
            })
            .into_task()
    }

    async fn run_all(&self, task: Task) -> Result<()> {
        let providers: Vec<_> = self
            .registry
            .library_sources()
            .into_iter()
            .filter(|provider| provider.library().is_some_and(|source| source.has_library()))
            .collect();
        let total = providers.len();
        let mut succeeded = 0usize;

        for (index, provider) in providers.into_iter().enumerate() {
            if task.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let display_name = provider.display_name().to_string();
            let child = self.start_provider_sync(provider);
            let base = index as f64;
            task.set_status(
                base / total as f64,
                format!("Waiting for {display_name} library sync to start"),
            );

            match self.follow(&task, &child, base, total).await {
                TaskOutcome::Completed => succeeded += 1,
                TaskOutcome::Cancelled if task.is_cancelled() => return Err(SyncError::Cancelled),
                outcome => {
                    let reason = outcome
                        .error()
                        .map_or_else(|| "cancelled".to_string(), |e| e.to_string());
                    warn!(provider = %display_name, reason = %reason, "Provider sync failed during sync:all");
                    task.set_status_text(format!("Error syncing {display_name} library: {reason}"));
                    self.pause(&task, self.config.failure_pause).await?;
                }
            }
        }

        task.set_status(
            1.0,
            format!("{succeeded} / {total} libraries synced successfully"),
        );
        info!(succeeded, total, "All library syncs finished");
        Ok(())
    }

    /// Mirror `child`'s status into `parent` until it settles, cancelling it
    /// if `parent` is cancelled.
    async fn follow(&self, parent: &Task, child: &Task, base: f64, total: usize) -> TaskOutcome {
        let mut status = child.subscribe_status();
        loop {
            tokio::select! {
                outcome = child.wait() => return outcome,
                _ = parent.cancelled() => {
                    child.cancel();
                    return child.wait().await;
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        return child.wait().await;
                    }
                    let current = status.borrow_and_update().clone();
                    parent.set_status((base + current.progress) / total as f64, current.text);
                }
            }
        }
    }

    // ========================================================================
    // Queries and control
    // ========================================================================

    /// Whether a live, uncancelled sync of `provider_name` is queued.
    pub fn is_synchronizing_library(&self, provider_name: &str) -> bool {
        self.queue
            .find_all_by_tag(&sync_task_name(provider_name))
            .iter()
            .any(is_live)
    }

    pub fn is_synchronizing_libraries(&self) -> bool {
        self.queue.tasks().iter().any(is_live)
    }

    /// Request cancellation of `provider_name`'s sync. Returns whether one
    /// was queued.
    pub fn cancel_library_sync(&self, provider_name: &str) -> bool {
        self.queue.cancel_by_tag(&sync_task_name(provider_name)) > 0
    }

    pub fn cancel_all_syncs(&self) {
        let cancelled = self.all_queue.cancel_all() + self.queue.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Cancelling library syncs");
        }
    }

    /// Wait for `sync:all` and every provider sync queued when called.
    pub async fn wait_for_syncs(&self) {
        self.all_queue.wait_for_all().await;
        self.queue.wait_for_all().await;
    }
}

fn is_live(task: &Task) -> bool {
    !task.is_settled() && !task.is_cancelled()
}

impl std::fmt::Debug for LibrarySynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibrarySynchronizer")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("all_queue", &self.all_queue)
            .finish()
    }
}
