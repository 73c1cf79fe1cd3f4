//! Provider answering catalog lookups from the local cache

use crate::cache::MediaCache;
use crate::pagination::PageRequest;
use crate::LibraryError;
use async_trait::async_trait;
use core_media::{Artist, MediaType, Track, TrackCollection};
use core_providers::{CatalogProvider, MediaProvider, ProviderError, ProviderErrorCode, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const LIBRARY_PROXY_NAME: &str = "localmedialibrary";
pub const LIBRARY_PROXY_DISPLAY_NAME: &str = "Media Library";

/// The library proxy provider. It owns no backend of its own: lookups read
/// whatever the synchronizer and earlier calls have cached, for any provider.
pub struct LibraryProxyProvider {
    cache: Arc<MediaCache>,
}

impl LibraryProxyProvider {
    pub fn new(cache: Arc<MediaCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    fn storage_error(&self, err: LibraryError) -> ProviderError {
        ProviderError::new(self.name(), ProviderErrorCode::Unknown, err.to_string())
    }

    fn decode<T: DeserializeOwned>(&self, uri: &str, json: Option<Value>) -> Result<T> {
        let json = json.ok_or_else(|| {
            ProviderError::new(
                self.name(),
                ProviderErrorCode::NotFound,
                format!("{uri} is not cached"),
            )
        })?;
        serde_json::from_value(json).map_err(|e| {
            ProviderError::new(
                self.name(),
                ProviderErrorCode::BadData,
                format!("cached {uri} is malformed: {e}"),
            )
        })
    }

    async fn collection(
        &self,
        uri: &str,
        expected: MediaType,
        include_items: bool,
    ) -> Result<TrackCollection> {
        let json = self
            .cache
            .get_track_collection_json(uri, include_items.then(PageRequest::all))
            .await
            .map_err(|e| self.storage_error(e))?;
        let collection: TrackCollection = self.decode(uri, json)?;
        if collection.media_type != expected {
            return Err(ProviderError::new(
                self.name(),
                ProviderErrorCode::NotFound,
                format!("{uri} is a cached {}, not a {expected}", collection.media_type),
            ));
        }
        Ok(collection)
    }
}

impl MediaProvider for LibraryProxyProvider {
    fn name(&self) -> &str {
        LIBRARY_PROXY_NAME
    }

    fn display_name(&self) -> &str {
        LIBRARY_PROXY_DISPLAY_NAME
    }

    fn catalog(&self) -> Option<&dyn CatalogProvider> {
        Some(self)
    }
}

#[async_trait]
impl CatalogProvider for LibraryProxyProvider {
    async fn get_track_data(&self, uri: &str) -> Result<Track> {
        debug!(uri, "Library proxy track lookup");
        let json = self
            .cache
            .get_track_json(uri)
            .await
            .map_err(|e| self.storage_error(e))?;
        self.decode(uri, json)
    }

    async fn get_artist_data(&self, uri: &str) -> Result<Artist> {
        let json = self
            .cache
            .get_artist_json(uri)
            .await
            .map_err(|e| self.storage_error(e))?;
        self.decode(uri, json)
    }

    async fn get_album_data(&self, uri: &str, include_items: bool) -> Result<TrackCollection> {
        self.collection(uri, MediaType::Album, include_items).await
    }

    async fn get_playlist_data(&self, uri: &str) -> Result<TrackCollection> {
        self.collection(uri, MediaType::Playlist, true).await
    }
}

impl std::fmt::Debug for LibraryProxyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryProxyProvider")
            .field("name", &LIBRARY_PROXY_NAME)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, InitializeOptions};
    use crate::db::DatabaseConfig;

    async fn proxy() -> LibraryProxyProvider {
        let cache = Arc::new(MediaCache::new(DatabaseConfig::in_memory()));
        cache.open().await.unwrap();
        cache.initialize(InitializeOptions::default()).await.unwrap();
        LibraryProxyProvider::new(cache)
    }

    #[tokio::test]
    async fn test_identity() {
        let proxy = proxy().await;
        assert_eq!(proxy.name(), "localmedialibrary");
        assert_eq!(proxy.display_name(), "Media Library");
        assert!(proxy.catalog().is_some());
        assert!(proxy.auth().is_none());
    }

    #[tokio::test]
    async fn test_track_lookup_reads_cache() {
        let proxy = proxy().await;
        let mut track = Track::new("spotify:track:1", "spotify", "Song");
        track.duration = Some(180.0);
        proxy
            .cache()
            .cache_tracks(&[track.clone()], CacheOptions::new())
            .await
            .unwrap();

        let found = proxy.get_track_data("spotify:track:1").await.unwrap();
        assert_eq!(found, track);
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let proxy = proxy().await;
        let err = proxy.get_track_data("spotify:track:missing").await.unwrap_err();
        assert_eq!(err.code(), Some(ProviderErrorCode::NotFound));
    }

    #[tokio::test]
    async fn test_album_lookup_checks_type() {
        let proxy = proxy().await;
        let playlist = TrackCollection::new(
            MediaType::Playlist,
            "spotify:playlist:1",
            "spotify",
            "Mix",
        );
        proxy
            .cache()
            .cache_track_collections(&[playlist], CacheOptions::new())
            .await
            .unwrap();

        assert!(proxy.get_playlist_data("spotify:playlist:1").await.is_ok());
        let err = proxy
            .get_album_data("spotify:playlist:1", false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ProviderErrorCode::NotFound));
    }

    #[tokio::test]
    async fn test_user_lookup_not_supported() {
        let proxy = proxy().await;
        let err = proxy.get_user_data("spotify:user:1").await.unwrap_err();
        assert_eq!(err.code(), Some(ProviderErrorCode::NotSupported));
    }
}
