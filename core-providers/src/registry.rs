//! # Provider Registry
//!
//! Active backend adapters and the `resolve` dispatch that turns a generic
//! `{provider, type, ...}` descriptor into a typed [`MediaItem`].
//!
//! ## Overview
//!
//! Lookups scan the registered providers in registration order and then fall
//! back to the library proxy, the provider that answers for the local cache.
//! Only the proxy may resolve `libraryItem` descriptors; their nested
//! `mediaItem` is resolved recursively against its own provider.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::new();
//! registry.register(Arc::new(SpotifyProvider::new(http)))?;
//!
//! let resolved = registry.resolve(&json!({
//!     "provider": "spotify",
//!     "type": "track",
//!     "uri": "spotify:track:1",
//!     "name": "Windowlicker"
//! }))?;
//! assert_eq!(resolved.provider.name(), "spotify");
//! ```

use crate::error::{ProviderError, Result};
use crate::provider::MediaProvider;
use core_media::{LibraryItem, MediaItem, MediaType, MediaUri};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// A resolved item together with the provider that built it.
#[derive(Clone)]
pub struct ResolvedItem {
    pub item: MediaItem,
    pub provider: Arc<dyn MediaProvider>,
}

impl fmt::Debug for ResolvedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedItem")
            .field("item", &self.item)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Registry of active providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn MediaProvider>>>,
    library_proxy: RwLock<Option<Arc<dyn MediaProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidArgument`] if a provider with the same
    /// name (including the library proxy) is already registered.
    pub fn register(&self, provider: Arc<dyn MediaProvider>) -> Result<()> {
        let name = provider.name().to_string();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_proxy_name(&name) {
            return Err(ProviderError::InvalidArgument(format!(
                "provider name {} is reserved for the media library",
                name
            )));
        }
        if providers.iter().any(|p| p.name() == name) {
            return Err(ProviderError::InvalidArgument(format!(
                "provider {} is already registered",
                name
            )));
        }

        info!(provider = %name, display_name = provider.display_name(), "Registered provider");
        providers.push(provider);
        Ok(())
    }

    /// Remove a provider by name, returning it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn MediaProvider>> {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let index = providers.iter().position(|p| p.name() == name)?;
        debug!(provider = %name, "Unregistered provider");
        Some(providers.remove(index))
    }

    /// Install the fallback provider answering for the local cache.
    pub fn set_library_proxy(&self, proxy: Arc<dyn MediaProvider>) {
        info!(provider = proxy.name(), "Installed library proxy");
        *self
            .library_proxy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(proxy);
    }

    pub fn library_proxy(&self) -> Option<Arc<dyn MediaProvider>> {
        self.library_proxy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_proxy_name(&self, name: &str) -> bool {
        self.library_proxy()
            .map_or(false, |proxy| proxy.name() == name)
    }

    /// Find a provider by name, falling back to the library proxy.
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn MediaProvider>> {
        let found = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.name() == name)
            .cloned();

        found.or_else(|| self.library_proxy().filter(|proxy| proxy.name() == name))
    }

    /// Registered providers in registration order, without the proxy.
    pub fn providers(&self) -> Vec<Arc<dyn MediaProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Providers exposing a saved library.
    pub fn library_sources(&self) -> Vec<Arc<dyn MediaProvider>> {
        self.providers()
            .into_iter()
            .filter(|p| p.library().is_some())
            .collect()
    }

    pub fn scrobblers(&self) -> Vec<Arc<dyn MediaProvider>> {
        self.providers()
            .into_iter()
            .filter(|p| p.scrobbler().is_some())
            .collect()
    }

    /// Route a descriptor to its provider's typed factory.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidArgument`] when `provider` or `type` is
    /// missing, the provider is not registered, the type is unknown, or a
    /// `libraryItem` names a provider other than the library proxy. Factory
    /// errors are returned unchanged.
    pub fn resolve(&self, json: &Value) -> Result<ResolvedItem> {
        let provider_name = json
            .get("provider")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::InvalidArgument("provider must be a string".to_string())
            })?;

        let type_name = json
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidArgument("type must be a non-empty string".to_string())
            })?;

        let media_type = type_name.parse::<MediaType>().map_err(|_| {
            ProviderError::InvalidArgument(format!("invalid media item type {}", type_name))
        })?;

        let provider = self.by_name(provider_name).ok_or_else(|| {
            ProviderError::InvalidArgument(format!("invalid provider name {}", provider_name))
        })?;

        if media_type != MediaType::LibraryItem {
            check_uri(json, provider_name, media_type)?;
        }

        let item = match media_type {
            MediaType::Track => MediaItem::Track(provider.track(json.clone())?),
            MediaType::Artist | MediaType::Label => MediaItem::Artist(provider.artist(json.clone())?),
            MediaType::Album => MediaItem::Album(provider.album(json.clone())?),
            MediaType::Playlist => MediaItem::Playlist(provider.playlist(json.clone())?),
            MediaType::User => MediaItem::User(provider.user_account(json.clone())?),
            MediaType::LibraryItem => {
                if !self.is_proxy_name(provider.name()) {
                    return Err(ProviderError::InvalidArgument(format!(
                        "provider {} cannot resolve library items",
                        provider_name
                    )));
                }
                MediaItem::LibraryItem(self.resolve_library_item(json)?)
            }
        };

        Ok(ResolvedItem { item, provider })
    }

    fn resolve_library_item(&self, json: &Value) -> Result<LibraryItem> {
        let library_provider = json
            .get("libraryProvider")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::InvalidArgument("libraryProvider must be a string".to_string())
            })?;
        let media_item = json.get("mediaItem").ok_or_else(|| {
            ProviderError::InvalidArgument("libraryItem is missing mediaItem".to_string())
        })?;

        let inner = self.resolve(media_item)?;
        let mut item = LibraryItem::new(library_provider, inner.item);
        if let Some(added_at) = json.get("addedAt").and_then(Value::as_str) {
            item = item.with_added_at(added_at);
        }
        item.validate()?;
        Ok(item)
    }
}

/// The descriptor's `uri` must decode to the provider and type it claims.
fn check_uri(json: &Value, provider_name: &str, media_type: MediaType) -> Result<()> {
    let uri = json.get("uri").and_then(Value::as_str).ok_or_else(|| {
        ProviderError::InvalidArgument("uri must be a string".to_string())
    })?;
    let parsed = MediaUri::parse(uri)?;
    if parsed.provider() != provider_name {
        return Err(ProviderError::InvalidArgument(format!(
            "uri {} does not belong to provider {}",
            uri, provider_name
        )));
    }
    if parsed.media_type() != media_type {
        return Err(ProviderError::InvalidArgument(format!(
            "uri {} does not name a {}",
            uri, media_type
        )));
    }
    Ok(())
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .providers()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .field(
                "library_proxy",
                &self.library_proxy().map(|p| p.name().to_string()),
            )
            .finish()
    }
}
