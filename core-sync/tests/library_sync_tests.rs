//! Integration tests for library synchronization
//!
//! These tests verify the complete sync workflow including:
//! - Paging a provider library into the cache with its resume cursor
//! - Resuming from, or discarding, a stored cursor
//! - Retry and failure policy for page fetches
//! - Deduplication, cancellation and `sync:all`

use async_trait::async_trait;
use core_library::{
    DatabaseConfig, DbState, InitializeOptions, LibraryItemOptions, MediaCache,
};
use core_media::{LibraryItem, MediaItem, Track};
use core_providers::{
    AuthProvider, LibraryPage, LibrarySource, MediaProvider, ProviderError, ProviderErrorCode,
    ProviderRegistry,
};
use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
use core_sync::{resume_state_key, LibrarySynchronizer, SyncConfig, SyncError};
use core_tasks::TaskOutcome;
use mockall::mock;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Implementations
// ============================================================================

mock! {
    pub Auth {}

    #[async_trait]
    impl AuthProvider for Auth {
        async fn login(&self) -> core_providers::Result<bool>;
        async fn logout(&self) -> core_providers::Result<()>;
        fn is_logged_in(&self) -> bool;
    }
}

/// Provider serving a fixed library in pages addressed by `{"page": n}`.
struct PagedProvider {
    name: String,
    pages: Vec<Vec<LibraryItem>>,
    has_library: bool,
    auth: Option<MockAuth>,
    failures: Mutex<VecDeque<ProviderError>>,
    requests: Mutex<Vec<Option<Value>>>,
}

impl PagedProvider {
    fn new(name: &str, page_sizes: &[usize]) -> Self {
        let mut counter = 0;
        let pages = page_sizes
            .iter()
            .map(|size| {
                (0..*size)
                    .map(|_| {
                        counter += 1;
                        let track = Track::new(
                            format!("{name}:track:{counter}"),
                            name,
                            format!("Song {counter}"),
                        );
                        LibraryItem::new(name, MediaItem::Track(track))
                    })
                    .collect()
            })
            .collect();
        Self {
            name: name.to_string(),
            pages,
            has_library: true,
            auth: None,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn without_library(mut self) -> Self {
        self.has_library = false;
        self
    }

    fn with_auth(mut self, auth: MockAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    fn failing_with(self, failures: Vec<ProviderError>) -> Self {
        *self.failures.lock().unwrap() = failures.into();
        self
    }

    fn requests(&self) -> Vec<Option<Value>> {
        self.requests.lock().unwrap().clone()
    }
}

impl MediaProvider for PagedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn auth(&self) -> Option<&dyn AuthProvider> {
        self.auth.as_ref().map(|auth| auth as &dyn AuthProvider)
    }

    fn library(&self) -> Option<&dyn LibrarySource> {
        Some(self)
    }
}

#[async_trait]
impl LibrarySource for PagedProvider {
    fn has_library(&self) -> bool {
        self.has_library
    }

    async fn fetch_library_page(
        &self,
        resume_data: Option<Value>,
    ) -> core_providers::Result<LibraryPage> {
        self.requests.lock().unwrap().push(resume_data.clone());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let index = resume_data
            .as_ref()
            .and_then(|data| data["page"].as_u64())
            .unwrap_or(0) as usize;
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let done = index + 1 >= self.pages.len();
        Ok(LibraryPage {
            items,
            resume_data: (!done).then(|| json!({ "page": index + 1 })),
            progress: (index + 1) as f64 / self.pages.len().max(1) as f64,
            done,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_page_delay(Duration::ZERO)
        .with_retry_delay(Duration::from_millis(1))
        .with_failure_pause(Duration::ZERO)
}

async fn setup(
    providers: Vec<Arc<PagedProvider>>,
    config: SyncConfig,
) -> (LibrarySynchronizer, Arc<MediaCache>, EventBus) {
    let cache = Arc::new(MediaCache::new(DatabaseConfig::in_memory()));
    cache.open().await.unwrap();
    cache.initialize(InitializeOptions::default()).await.unwrap();

    let registry = Arc::new(ProviderRegistry::new());
    for provider in providers {
        registry.register(provider).unwrap();
    }

    let bus = EventBus::new(256);
    let synchronizer =
        LibrarySynchronizer::new(registry, cache.clone(), config).with_event_bus(bus.clone());
    (synchronizer, cache, bus)
}

async fn saved_count(cache: &MediaCache, provider: &str) -> u64 {
    cache
        .get_saved_tracks_count(LibraryItemOptions::for_provider(provider))
        .await
        .unwrap()
}

fn sync_error(outcome: &TaskOutcome) -> &SyncError {
    outcome
        .error()
        .and_then(|e| e.downcast_ref::<SyncError>())
        .expect("task should fail with a SyncError")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_sync_caches_every_page() {
    let provider = Arc::new(PagedProvider::new("spotify", &[2, 2, 1]));
    let (synchronizer, cache, _bus) = setup(vec![provider.clone()], fast_config()).await;

    let task = synchronizer.synchronize_library("spotify").unwrap();
    assert!(task.wait().await.is_completed());

    assert_eq!(saved_count(&cache, "spotify").await, 5);
    assert_eq!(
        provider.requests(),
        vec![None, Some(json!({"page": 1})), Some(json!({"page": 2}))]
    );
    assert_eq!(
        cache
            .get_state_value(&resume_state_key("spotify"), "")
            .await
            .unwrap(),
        "null"
    );
    assert_eq!(task.status().progress, 1.0);
    assert_eq!(task.status().text, "Finished synchronizing spotify library");
    assert!(!synchronizer.is_synchronizing_library("spotify"));
}

#[tokio::test]
async fn test_sync_resumes_from_stored_cursor() {
    let provider = Arc::new(PagedProvider::new("spotify", &[2, 2, 1]));
    let (synchronizer, cache, _bus) = setup(vec![provider.clone()], fast_config()).await;

    let mut state = DbState::new();
    state.insert(resume_state_key("spotify"), json!({"page": 1}).to_string());
    cache.set_state(&state).await.unwrap();

    let task = synchronizer.synchronize_library("spotify").unwrap();
    assert!(task.wait().await.is_completed());

    assert_eq!(provider.requests()[0], Some(json!({"page": 1})));
    assert_eq!(saved_count(&cache, "spotify").await, 3);
}

#[tokio::test]
async fn test_unreadable_cursor_starts_over() {
    let provider = Arc::new(PagedProvider::new("spotify", &[1, 1]));
    let (synchronizer, cache, _bus) = setup(vec![provider.clone()], fast_config()).await;

    let mut state = DbState::new();
    state.insert(resume_state_key("spotify"), "{not json".to_string());
    cache.set_state(&state).await.unwrap();

    let task = synchronizer.synchronize_library("spotify").unwrap();
    assert!(task.wait().await.is_completed());
    assert_eq!(provider.requests()[0], None);
    assert_eq!(saved_count(&cache, "spotify").await, 2);
}

#[tokio::test]
async fn test_second_request_joins_running_sync() {
    let provider = Arc::new(PagedProvider::new("spotify", &[1, 1, 1]));
    let config = fast_config().with_page_delay(Duration::from_secs(60));
    let (synchronizer, _cache, _bus) = setup(vec![provider], config).await;

    let first = synchronizer.synchronize_library("spotify").unwrap();
    let second = synchronizer.synchronize_library("spotify").unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(synchronizer.queue().task_count(), 1);
    assert!(synchronizer.is_synchronizing_library("spotify"));
    assert!(synchronizer.is_synchronizing_libraries());

    synchronizer.cancel_all_syncs();
    synchronizer.wait_for_syncs().await;
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
    let (synchronizer, _cache, _bus) = setup(vec![], fast_config()).await;
    let err = synchronizer.synchronize_library("nobody").unwrap_err();
    assert!(matches!(err, SyncError::ProviderNotFound(name) if name == "nobody"));
}

#[tokio::test]
async fn test_logged_out_provider_fails_without_fetching() {
    let mut auth = MockAuth::new();
    auth.expect_is_logged_in().returning(|| false);
    let provider = Arc::new(PagedProvider::new("spotify", &[1]).with_auth(auth));
    let (synchronizer, _cache, _bus) = setup(vec![provider.clone()], fast_config()).await;

    let outcome = synchronizer
        .synchronize_library("spotify")
        .unwrap()
        .wait()
        .await;

    assert!(matches!(sync_error(&outcome), SyncError::NotLoggedIn { .. }));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_logged_in_provider_syncs() {
    let mut auth = MockAuth::new();
    auth.expect_is_logged_in().times(1).returning(|| true);
    let provider = Arc::new(PagedProvider::new("spotify", &[1]).with_auth(auth));
    let (synchronizer, cache, _bus) = setup(vec![provider], fast_config()).await;

    let task = synchronizer.synchronize_library("spotify").unwrap();
    assert!(task.wait().await.is_completed());
    assert_eq!(saved_count(&cache, "spotify").await, 1);
}

#[tokio::test]
async fn test_provider_without_library_fails() {
    let provider = Arc::new(PagedProvider::new("bandcamp", &[1]).without_library());
    let (synchronizer, _cache, _bus) = setup(vec![provider], fast_config()).await;

    let outcome = synchronizer
        .synchronize_library("bandcamp")
        .unwrap()
        .wait()
        .await;
    assert!(matches!(sync_error(&outcome), SyncError::NoLibrary { .. }));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let provider = Arc::new(PagedProvider::new("spotify", &[1, 1]).failing_with(vec![
        ProviderError::rate_limited("spotify", Some(Duration::from_millis(5))),
        ProviderError::new("spotify", ProviderErrorCode::Unknown, "502 from upstream"),
    ]));
    let (synchronizer, cache, _bus) = setup(vec![provider.clone()], fast_config()).await;

    let task = synchronizer.synchronize_library("spotify").unwrap();
    assert!(task.wait().await.is_completed());

    // Two failed attempts at the first page, then one request per page
    assert_eq!(provider.requests().len(), 4);
    assert_eq!(saved_count(&cache, "spotify").await, 2);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_sync() {
    let failures = (0..5)
        .map(|_| ProviderError::rate_limited("spotify", None))
        .collect();
    let provider = Arc::new(PagedProvider::new("spotify", &[1]).failing_with(failures));
    let config = fast_config().with_max_page_retries(2);
    let (synchronizer, cache, _bus) = setup(vec![provider.clone()], config).await;

    let outcome = synchronizer
        .synchronize_library("spotify")
        .unwrap()
        .wait()
        .await;

    match sync_error(&outcome) {
        SyncError::Provider(e) => assert_eq!(e.code(), Some(ProviderErrorCode::RateLimited)),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(provider.requests().len(), 3);
    assert_eq!(saved_count(&cache, "spotify").await, 0);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let provider = Arc::new(PagedProvider::new("spotify", &[1]).failing_with(vec![
        ProviderError::new("spotify", ProviderErrorCode::BadCredentials, "token revoked"),
    ]));
    let (synchronizer, _cache, _bus) = setup(vec![provider.clone()], fast_config()).await;

    let outcome = synchronizer
        .synchronize_library("spotify")
        .unwrap()
        .wait()
        .await;
    assert!(matches!(sync_error(&outcome), SyncError::Provider(_)));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_cancel_keeps_committed_pages_and_cursor() {
    let provider = Arc::new(PagedProvider::new("spotify", &[2, 2, 2]));
    let config = fast_config().with_page_delay(Duration::from_secs(60));
    let (synchronizer, cache, bus) = setup(vec![provider], config).await;
    let mut events = EventStream::new(bus.subscribe())
        .filter(|event| matches!(event, CoreEvent::Sync(_)));

    let task = synchronizer.synchronize_library("spotify").unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Started {
            provider: "spotify".to_string()
        })
    );
    let progress = events.recv().await.unwrap();
    assert!(matches!(
        progress,
        CoreEvent::Sync(SyncEvent::Progress { items_cached: 2, .. })
    ));

    // The sync is now sleeping between pages
    assert!(synchronizer.cancel_library_sync("spotify"));
    assert!(!synchronizer.is_synchronizing_library("spotify"));
    assert!(task.wait().await.is_cancelled());

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Cancelled {
            provider: "spotify".to_string(),
            items_cached: 2
        })
    );
    assert_eq!(saved_count(&cache, "spotify").await, 2);
    assert_eq!(
        cache
            .get_state_value(&resume_state_key("spotify"), "")
            .await
            .unwrap(),
        json!({"page": 1}).to_string()
    );
    assert!(!synchronizer.cancel_library_sync("spotify"));
}

#[tokio::test]
async fn test_sync_all_continues_past_failures() {
    let good = Arc::new(PagedProvider::new("spotify", &[2, 1]));
    let bad = Arc::new(PagedProvider::new("youtube", &[1]).failing_with(vec![
        ProviderError::new("youtube", ProviderErrorCode::NeedsPremium, "premium required"),
    ]));
    let skipped = Arc::new(PagedProvider::new("bandcamp", &[1]).without_library());
    let (synchronizer, cache, _bus) =
        setup(vec![bad.clone(), good, skipped.clone()], fast_config()).await;

    let task = synchronizer.synchronize_all_libraries();
    assert!(task.wait().await.is_completed());

    assert_eq!(task.status().text, "1 / 2 libraries synced successfully");
    assert_eq!(task.status().progress, 1.0);
    assert_eq!(saved_count(&cache, "spotify").await, 3);
    assert_eq!(bad.requests().len(), 1);
    assert!(skipped.requests().is_empty());
}

#[tokio::test]
async fn test_cancelling_sync_all_cancels_current_child() {
    let provider = Arc::new(PagedProvider::new("spotify", &[1, 1, 1]));
    let other = Arc::new(PagedProvider::new("deezer", &[1]));
    let config = fast_config().with_page_delay(Duration::from_secs(60));
    let (synchronizer, cache, _bus) = setup(vec![provider, other.clone()], config).await;

    let all = synchronizer.synchronize_all_libraries();
    let again = synchronizer.synchronize_all_libraries();
    assert!(all.ptr_eq(&again));

    // Wait for the first child to commit its first page
    let mut status = all.subscribe_status();
    status
        .wait_for(|status| status.progress > 0.0)
        .await
        .unwrap();

    synchronizer.cancel_all_syncs();
    synchronizer.wait_for_syncs().await;

    assert!(all.outcome().unwrap().is_cancelled());
    assert!(!synchronizer.is_synchronizing_libraries());
    assert_eq!(saved_count(&cache, "spotify").await, 1);
    assert!(other.requests().is_empty());
}
