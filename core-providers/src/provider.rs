//! # Provider Capabilities
//!
//! A backend adapter implements [`MediaProvider`] and then only the capability
//! traits it actually supports. Capability presence is discovered through the
//! `Option` accessors on `MediaProvider`, never through a class hierarchy.
//!
//! | Capability | Trait |
//! |------------|-------|
//! | Catalog lookups | [`CatalogProvider`] |
//! | Login state | [`AuthProvider`] |
//! | Saved library paging | [`LibrarySource`] |
//! | Remote playback | [`PlaybackProvider`] |
//! | Playlist storage | [`StorageProvider`] |
//! | Scrobbling | [`Scrobbler`] |
//!
//! ## Usage
//!
//! ```ignore
//! struct Bandcamp { http: Arc<dyn HttpClient> }
//!
//! impl MediaProvider for Bandcamp {
//!     fn name(&self) -> &str { "bandcamp" }
//!     fn display_name(&self) -> &str { "Bandcamp" }
//!     fn catalog(&self) -> Option<&dyn CatalogProvider> { Some(self) }
//! }
//!
//! #[async_trait]
//! impl CatalogProvider for Bandcamp {
//!     async fn get_album_data(&self, uri: &str, include_items: bool) -> Result<TrackCollection> {
//!         let response = self.http.execute(HttpRequest::get(uri)).await?;
//!         // scrape and build the collection
//!     }
//! }
//! ```

use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_media::{
    Artist, LibraryItem, MediaType, Track, TrackCollection, UserAccount,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Base Provider
// ============================================================================

/// Base contract of every backend adapter.
///
/// The typed factories turn canonical JSON into items bound to this
/// provider. A payload without a `provider` field is claimed by this
/// provider; a payload naming another provider is rejected.
pub trait MediaProvider: Send + Sync {
    /// Stable identifier used in URIs and cache rows
    fn name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str;

    fn track(&self, data: Value) -> Result<Track> {
        let track: Track = decode_owned(self.name(), data, &[MediaType::Track])?;
        track.validate()?;
        Ok(track)
    }

    /// Builds an artist or label.
    fn artist(&self, data: Value) -> Result<Artist> {
        let artist: Artist =
            decode_owned(self.name(), data, &[MediaType::Artist, MediaType::Label])?;
        artist.validate()?;
        Ok(artist)
    }

    fn album(&self, data: Value) -> Result<TrackCollection> {
        let album: TrackCollection = decode_owned(self.name(), data, &[MediaType::Album])?;
        album.validate()?;
        Ok(album)
    }

    fn playlist(&self, data: Value) -> Result<TrackCollection> {
        let playlist: TrackCollection = decode_owned(self.name(), data, &[MediaType::Playlist])?;
        playlist.validate()?;
        Ok(playlist)
    }

    fn user_account(&self, data: Value) -> Result<UserAccount> {
        decode_owned(self.name(), data, &[MediaType::User])
    }

    fn catalog(&self) -> Option<&dyn CatalogProvider> {
        None
    }

    fn auth(&self) -> Option<&dyn AuthProvider> {
        None
    }

    fn library(&self) -> Option<&dyn LibrarySource> {
        None
    }

    fn playback(&self) -> Option<&dyn PlaybackProvider> {
        None
    }

    fn storage(&self) -> Option<&dyn StorageProvider> {
        None
    }

    fn scrobbler(&self) -> Option<&dyn Scrobbler> {
        None
    }
}

/// Deserialize `data` as an item owned by `provider`.
///
/// Fills in a missing `provider` and `type` (the first accepted type), and
/// rejects a foreign provider or a type outside `accepted`.
pub fn decode_owned<T: DeserializeOwned>(
    provider: &str,
    mut data: Value,
    accepted: &[MediaType],
) -> Result<T> {
    let object = data.as_object_mut().ok_or_else(|| {
        ProviderError::InvalidArgument("media item data must be a JSON object".to_string())
    })?;

    match object.get("provider") {
        None | Some(Value::Null) => {
            object.insert("provider".to_string(), Value::String(provider.to_string()));
        }
        Some(Value::String(owner)) if owner == provider => {}
        Some(other) => {
            return Err(ProviderError::InvalidArgument(format!(
                "item of provider {} cannot be created by {}",
                other, provider
            )))
        }
    }

    match object.get("type").and_then(Value::as_str) {
        None => {
            if let Some(default_type) = accepted.first() {
                object.insert(
                    "type".to_string(),
                    Value::String(default_type.as_str().to_string()),
                );
            }
        }
        Some(type_name) => {
            let media_type = type_name.parse::<MediaType>()?;
            if !accepted.contains(&media_type) {
                return Err(ProviderError::InvalidArgument(format!(
                    "unexpected media type {}",
                    media_type
                )));
            }
        }
    }

    serde_json::from_value(data)
        .map_err(|e| ProviderError::InvalidArgument(format!("invalid media item: {}", e)))
}

// ============================================================================
// Catalog
// ============================================================================

/// Point lookups against the provider's catalog.
///
/// Every lookup defaults to a `NotSupported` provider error.
#[async_trait]
pub trait CatalogProvider: MediaProvider {
    async fn get_track_data(&self, uri: &str) -> Result<Track> {
        let _ = uri;
        Err(ProviderError::not_supported(self.name(), "track lookup"))
    }

    async fn get_artist_data(&self, uri: &str) -> Result<Artist> {
        let _ = uri;
        Err(ProviderError::not_supported(self.name(), "artist lookup"))
    }

    /// Album metadata, with its items when `include_items` is set.
    async fn get_album_data(&self, uri: &str, include_items: bool) -> Result<TrackCollection> {
        let _ = (uri, include_items);
        Err(ProviderError::not_supported(self.name(), "album lookup"))
    }

    async fn get_playlist_data(&self, uri: &str) -> Result<TrackCollection> {
        let _ = uri;
        Err(ProviderError::not_supported(self.name(), "playlist lookup"))
    }

    async fn get_user_data(&self, uri: &str) -> Result<UserAccount> {
        let _ = uri;
        Err(ProviderError::not_supported(self.name(), "user lookup"))
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Run the login flow. Returns `false` when the user aborted it.
    async fn login(&self) -> Result<bool>;

    async fn logout(&self) -> Result<()>;

    fn is_logged_in(&self) -> bool;
}

// ============================================================================
// Library
// ============================================================================

/// One page of a provider's saved library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPage {
    pub items: Vec<LibraryItem>,
    /// Opaque cursor for the next page; persisted with the page
    pub resume_data: Option<Value>,
    /// Overall progress in `0.0..=1.0`
    pub progress: f64,
    /// No pages remain
    pub done: bool,
}

impl LibraryPage {
    pub fn last(items: Vec<LibraryItem>) -> Self {
        Self {
            items,
            resume_data: None,
            progress: 1.0,
            done: true,
        }
    }
}

/// Pull-based paging over a user's saved library.
#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Whether the current account has a library to sync.
    fn has_library(&self) -> bool;

    /// Fetch the page after `resume_data`, or the first page for `None`.
    async fn fetch_library_page(&self, resume_data: Option<Value>) -> Result<LibraryPage>;
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub playing: bool,
    /// Seconds
    pub position: f64,
    pub track_uri: Option<String>,
}

#[async_trait]
pub trait PlaybackProvider: Send + Sync {
    /// Start `track` at `position` seconds.
    async fn play(&self, track: &Track, position: f64) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn state(&self) -> Result<PlaybackState>;
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistOptions {
    pub description: Option<String>,
    pub public: bool,
}

/// Playlist storage owned by the provider.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn create_playlist(
        &self,
        name: &str,
        options: CreatePlaylistOptions,
    ) -> Result<TrackCollection>;

    async fn delete_playlist(&self, uri: &str) -> Result<()>;

    async fn can_edit_playlist(&self, uri: &str) -> Result<bool>;
}

// ============================================================================
// Scrobbling
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub track: String,
    pub artist: String,
    pub album: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scrobble {
    pub track: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrobbleResult {
    pub accepted: bool,
    pub ignored_reason: Option<String>,
}

#[async_trait]
pub trait Scrobbler: Send + Sync {
    async fn update_now_playing(&self, request: NowPlaying) -> Result<()>;

    /// Submit scrobbles; one result per input, in order.
    async fn scrobble(&self, scrobbles: Vec<Scrobble>) -> Result<Vec<ScrobbleResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use serde_json::json;

    struct Catalogless;

    impl MediaProvider for Catalogless {
        fn name(&self) -> &str {
            "soundcloud"
        }

        fn display_name(&self) -> &str {
            "SoundCloud"
        }

        fn catalog(&self) -> Option<&dyn CatalogProvider> {
            Some(self)
        }
    }

    #[async_trait]
    impl CatalogProvider for Catalogless {}

    #[test]
    fn test_factory_claims_missing_provider() {
        let track = Catalogless
            .track(json!({ "uri": "soundcloud:track:1", "name": "Loop" }))
            .unwrap();
        assert_eq!(track.provider, "soundcloud");
        assert_eq!(track.media_type, MediaType::Track);
    }

    #[test]
    fn test_factory_rejects_foreign_provider() {
        let result = Catalogless.track(json!({
            "uri": "spotify:track:1",
            "provider": "spotify",
            "name": "Loop"
        }));
        assert!(matches!(result, Err(ProviderError::InvalidArgument(_))));
    }

    #[test]
    fn test_factory_rejects_wrong_type() {
        let result = Catalogless.album(json!({
            "type": "playlist",
            "uri": "soundcloud:playlist:1",
            "name": "Set"
        }));
        assert!(matches!(result, Err(ProviderError::InvalidArgument(_))));

        let label = Catalogless
            .artist(json!({ "type": "label", "uri": "soundcloud:label:1", "name": "Ninja Tune" }))
            .unwrap();
        assert_eq!(label.media_type, MediaType::Label);
    }

    #[test]
    fn test_capabilities_default_to_absent() {
        let provider = Catalogless;
        assert!(provider.catalog().is_some());
        assert!(provider.auth().is_none());
        assert!(provider.library().is_none());
        assert!(provider.playback().is_none());
        assert!(provider.storage().is_none());
        assert!(provider.scrobbler().is_none());
    }

    #[tokio::test]
    async fn test_catalog_defaults_to_not_supported() {
        let provider = Catalogless;
        let catalog = provider.catalog().unwrap();

        let err = catalog.get_track_data("soundcloud:track:1").await.unwrap_err();
        assert_eq!(err.code(), Some(ProviderErrorCode::NotSupported));

        let err = catalog
            .get_album_data("soundcloud:album:1", true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("album lookup"));
    }

    #[test]
    fn test_library_page_last() {
        let page = LibraryPage::last(Vec::new());
        assert!(page.done);
        assert_eq!(page.progress, 1.0);
        assert!(page.resume_data.is_none());
    }
}
