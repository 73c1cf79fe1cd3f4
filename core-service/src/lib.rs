//! Core service façade and bootstrap.
//!
//! This crate wires the provider registry, the media cache, the library
//! proxy and the library synchronizer into one [`CoreService`] created at
//! startup and passed to whatever needs it. Host-provided transports reach
//! provider factories through [`CoreDependencies`]. Desktop apps typically
//! enable the `desktop-shims` feature, which supplies the default
//! `ReqwestHttpClient` when the config carries no client.
//!
//! ```rust,ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder().database_path("media.db").build()?;
//! let core = CoreService::builder(config)
//!     .provider_factory(|deps| Ok(Arc::new(MyProvider::new(deps.require_http_client()?))))
//!     .build()
//!     .await?;
//!
//! core.synchronizer().synchronize_all_libraries();
//! core.shutdown().await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use core_library::{DatabaseConfig, InitializeOptions, LibraryProxyProvider, MediaCache};
use core_providers::{MediaProvider, ProviderRegistry, ResolvedItem};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{LibrarySynchronizer, SyncConfig};
use serde_json::Value;
use tracing::{info, instrument, warn};

/// Host handles offered to provider factories.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub event_bus: EventBus,
}

impl CoreDependencies {
    /// The configured transport, or `CapabilityMissing`.
    pub fn require_http_client(&self) -> Result<Arc<dyn HttpClient>> {
        self.http_client
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "no HttpClient was configured; enable 'desktop-shims' or inject one \
                          with CoreConfigBuilder::http_client"
                    .to_string(),
            })
    }
}

type ProviderFactory = Box<dyn FnOnce(&CoreDependencies) -> Result<Arc<dyn MediaProvider>> + Send>;

/// Builder for [`CoreService`].
pub struct CoreServiceBuilder {
    config: CoreConfig,
    providers: Vec<Arc<dyn MediaProvider>>,
    factories: Vec<ProviderFactory>,
}

impl CoreServiceBuilder {
    /// Register an already constructed provider.
    pub fn provider(mut self, provider: Arc<dyn MediaProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Register a provider built from the service's dependencies during
    /// [`build`](Self::build).
    pub fn provider_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&CoreDependencies) -> Result<Arc<dyn MediaProvider>> + Send + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }

    /// Open and initialize the cache, then register the library proxy and
    /// every provider.
    ///
    /// # Errors
    ///
    /// Fails when the cache cannot be opened, a factory fails, or two
    /// providers share a name. The cache is closed again on failure.
    #[instrument(skip(self), fields(providers = self.providers.len() + self.factories.len()))]
    pub async fn build(self) -> Result<CoreService> {
        let events = EventBus::new(self.config.event_buffer_size);
        let database = match &self.config.database_path {
            Some(path) => DatabaseConfig::new(path),
            None => DatabaseConfig::in_memory(),
        };

        let cache = Arc::new(MediaCache::new(database).with_event_bus(events.clone()));
        cache.open().await?;
        if let Err(e) = cache.initialize(InitializeOptions::default()).await {
            close_quietly(&cache).await;
            return Err(e.into());
        }

        let registry = Arc::new(ProviderRegistry::new());
        registry.set_library_proxy(Arc::new(LibraryProxyProvider::new(cache.clone())));

        let dependencies = CoreDependencies {
            http_client: self.config.http_client.clone(),
            event_bus: events.clone(),
        };
        if let Err(e) = register_providers(&registry, &dependencies, self.providers, self.factories) {
            close_quietly(&cache).await;
            return Err(e);
        }

        let synchronizer = LibrarySynchronizer::new(
            registry.clone(),
            cache.clone(),
            SyncConfig::from(&self.config.sync),
        )
        .with_event_bus(events.clone());

        info!(
            providers = registry.providers().len(),
            location = %cache.config().location(),
            "Core service ready"
        );

        Ok(CoreService {
            inner: Arc::new(ServiceInner {
                config: self.config,
                registry,
                cache,
                synchronizer,
                events,
            }),
        })
    }
}

fn register_providers(
    registry: &ProviderRegistry,
    dependencies: &CoreDependencies,
    providers: Vec<Arc<dyn MediaProvider>>,
    factories: Vec<ProviderFactory>,
) -> Result<()> {
    for provider in providers {
        registry.register(provider)?;
    }
    for factory in factories {
        registry.register(factory(dependencies)?)?;
    }
    Ok(())
}

async fn close_quietly(cache: &MediaCache) {
    if let Err(e) = cache.close().await {
        warn!(error = %e, "Failed to close media cache after aborted startup");
    }
}

struct ServiceInner {
    config: CoreConfig,
    registry: Arc<ProviderRegistry>,
    cache: Arc<MediaCache>,
    synchronizer: LibrarySynchronizer,
    events: EventBus,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    pub fn builder(config: CoreConfig) -> CoreServiceBuilder {
        CoreServiceBuilder {
            config,
            providers: Vec::new(),
            factories: Vec::new(),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.inner.cache
    }

    pub fn synchronizer(&self) -> &LibrarySynchronizer {
        &self.inner.synchronizer
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// A fresh subscription to every core event.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    /// Route a media item descriptor to its provider.
    pub fn resolve(&self, json: &Value) -> Result<ResolvedItem> {
        Ok(self.inner.registry.resolve(json)?)
    }

    /// Cancel and wait for every library sync, then close the cache.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        let synchronizer = &self.inner.synchronizer;
        synchronizer.cancel_all_syncs();
        synchronizer.wait_for_syncs().await;
        self.inner.cache.close().await?;
        info!("Core service stopped");
        Ok(())
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.inner.config)
            .field("providers", &self.inner.registry.providers().len())
            .finish()
    }
}
