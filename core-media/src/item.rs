//! Media item variants and their canonical JSON shape.
//!
//! Every struct carries its `type` tag, the `uri` and `provider` that own it,
//! and an `extra` map collecting any field the core does not interpret.
//! Provider-specific data therefore survives a round trip through the cache
//! untouched.

use crate::error::{MediaError, Result};
use crate::uri::{MediaType, MediaUri};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Provider fields not modelled by the core.
pub type Extra = Map<String, Value>;

fn default_true() -> bool {
    true
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

// ============================================================================
// Images
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    Tiny,
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

// ============================================================================
// Entities
// ============================================================================

/// A playable track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(rename = "type", default = "Track::default_type")]
    pub media_type: MediaType,
    pub uri: String,
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_uri: Option<String>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<u32>,
    #[serde(default = "default_true")]
    pub playable: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Track {
    fn default_type() -> MediaType {
        MediaType::Track
    }

    pub fn new(uri: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Track,
            uri: uri.into(),
            provider: provider.into(),
            name: name.into(),
            album_name: None,
            album_uri: None,
            artists: Vec::new(),
            images: None,
            duration: None,
            track_number: None,
            disc_number: None,
            playable: true,
            extra: Extra::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.uri, &self.provider, self.media_type)?;
        if self.media_type != MediaType::Track {
            return Err(MediaError::InvalidItem(format!(
                "track {} has type {}",
                self.uri, self.media_type
            )));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(MediaError::InvalidItem(format!(
                    "track {} has invalid duration {}",
                    self.uri, duration
                )));
            }
        }
        // Embedded artists may be name-only references without a uri.
        if let Some(artist) = self.artists.iter().find(|a| !a.media_type.is_artist()) {
            return Err(MediaError::InvalidItem(format!(
                "track {} lists artist {} of type {}",
                self.uri, artist.name, artist.media_type
            )));
        }
        Ok(())
    }
}

/// An artist or record label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    #[serde(rename = "type", default = "Artist::default_type")]
    pub media_type: MediaType,
    pub uri: String,
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Artist {
    fn default_type() -> MediaType {
        MediaType::Artist
    }

    pub fn new(uri: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Artist,
            uri: uri.into(),
            provider: provider.into(),
            name: name.into(),
            images: None,
            extra: Extra::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.uri, &self.provider, self.media_type)?;
        if !self.media_type.is_artist() {
            return Err(MediaError::InvalidItem(format!(
                "artist {} has type {}",
                self.uri, self.media_type
            )));
        }
        Ok(())
    }
}

/// An album or playlist together with a window of its items.
///
/// `items[i]` sits at position `items_offset + i` in the full collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCollection {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub uri: String,
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserAccount>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub items_offset: usize,
    #[serde(default)]
    pub items: Vec<TrackCollectionItem>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TrackCollection {
    pub fn new(
        media_type: MediaType,
        uri: impl Into<String>,
        provider: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            media_type,
            uri: uri.into(),
            provider: provider.into(),
            name: name.into(),
            version_id: None,
            item_count: None,
            artists: Vec::new(),
            images: None,
            owner: None,
            items_offset: 0,
            items: Vec::new(),
            extra: Extra::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.uri, &self.provider, self.media_type)?;
        if !self.media_type.is_collection() {
            return Err(MediaError::InvalidItem(format!(
                "collection {} has type {}",
                self.uri, self.media_type
            )));
        }
        for item in &self.items {
            item.track.validate()?;
        }
        Ok(())
    }

    /// Absolute positions paired with the items of this window.
    pub fn indexed_items(&self) -> impl Iterator<Item = (usize, &TrackCollectionItem)> {
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (self.items_offset + i, item))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCollectionItem {
    pub track: Track,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<UserAccount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    #[serde(rename = "type", default = "UserAccount::default_type")]
    pub media_type: MediaType,
    pub uri: String,
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl UserAccount {
    fn default_type() -> MediaType {
        MediaType::User
    }

    pub fn new(uri: impl Into<String>, provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::User,
            uri: uri.into(),
            provider: provider.into(),
            name: name.into(),
            images: None,
            extra: Extra::new(),
        }
    }
}

/// Membership of a track, album or playlist in a provider's saved library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    #[serde(rename = "type", default = "LibraryItem::default_type")]
    pub media_type: MediaType,
    /// Provider whose library the item was saved in
    pub library_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
    pub media_item: Box<MediaItem>,
}

impl LibraryItem {
    fn default_type() -> MediaType {
        MediaType::LibraryItem
    }

    pub fn new(library_provider: impl Into<String>, media_item: MediaItem) -> Self {
        Self {
            media_type: MediaType::LibraryItem,
            library_provider: library_provider.into(),
            added_at: None,
            media_item: Box::new(media_item),
        }
    }

    pub fn with_added_at(mut self, added_at: impl Into<String>) -> Self {
        self.added_at = Some(added_at.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.library_provider.is_empty() {
            return Err(MediaError::InvalidItem(
                "library item has no libraryProvider".to_string(),
            ));
        }
        match self.media_item.as_ref() {
            MediaItem::Track(track) => track.validate(),
            MediaItem::Album(collection) | MediaItem::Playlist(collection) => {
                collection.validate()
            }
            other => Err(MediaError::InvalidItem(format!(
                "library item cannot hold a {}",
                other.media_type()
            ))),
        }
    }
}

/// The uri must decode to the item's own provider and type.
fn validate_identity(uri: &str, provider: &str, media_type: MediaType) -> Result<()> {
    if uri.is_empty() {
        return Err(MediaError::InvalidItem("uri is empty".to_string()));
    }
    if provider.is_empty() {
        return Err(MediaError::InvalidItem(format!("{} has no provider", uri)));
    }
    let parsed = MediaUri::parse(uri)?;
    if parsed.provider() != provider {
        return Err(MediaError::invalid_uri(
            uri,
            format!("belongs to provider {}, not {}", parsed.provider(), provider),
        ));
    }
    if parsed.media_type() != media_type {
        return Err(MediaError::invalid_uri(
            uri,
            format!("names a {}, not a {}", parsed.media_type(), media_type),
        ));
    }
    Ok(())
}

// ============================================================================
// Media Item
// ============================================================================

/// Any media entity, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaItem {
    Track(Track),
    Artist(Artist),
    Album(TrackCollection),
    Playlist(TrackCollection),
    User(UserAccount),
    LibraryItem(LibraryItem),
}

impl MediaItem {
    /// Decode a canonical JSON object, dispatching on its `type` field.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidItem`] when `type` is missing or the
    /// payload does not match the variant, and [`MediaError::UnknownType`]
    /// for an unrecognized `type`.
    pub fn from_json(value: Value) -> Result<Self> {
        let media_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MediaError::InvalidItem("missing string field 'type'".to_string()))?
            .parse::<MediaType>()?;

        let item = match media_type {
            MediaType::Track => MediaItem::Track(serde_json::from_value(value)?),
            MediaType::Artist | MediaType::Label => MediaItem::Artist(serde_json::from_value(value)?),
            MediaType::Album => MediaItem::Album(serde_json::from_value(value)?),
            MediaType::Playlist => MediaItem::Playlist(serde_json::from_value(value)?),
            MediaType::User => MediaItem::User(serde_json::from_value(value)?),
            MediaType::LibraryItem => MediaItem::LibraryItem(serde_json::from_value(value)?),
        };
        Ok(item)
    }

    /// Canonical JSON projection.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            MediaItem::Track(track) => track.media_type,
            MediaItem::Artist(artist) => artist.media_type,
            MediaItem::Album(_) => MediaType::Album,
            MediaItem::Playlist(_) => MediaType::Playlist,
            MediaItem::User(_) => MediaType::User,
            MediaItem::LibraryItem(_) => MediaType::LibraryItem,
        }
    }

    /// URI of the entity; a library item reports the URI of what it holds.
    pub fn uri(&self) -> &str {
        match self {
            MediaItem::Track(track) => &track.uri,
            MediaItem::Artist(artist) => &artist.uri,
            MediaItem::Album(collection) | MediaItem::Playlist(collection) => &collection.uri,
            MediaItem::User(user) => &user.uri,
            MediaItem::LibraryItem(item) => item.media_item.uri(),
        }
    }

    /// Name of the provider owning the entity.
    pub fn provider(&self) -> &str {
        match self {
            MediaItem::Track(track) => &track.provider,
            MediaItem::Artist(artist) => &artist.provider,
            MediaItem::Album(collection) | MediaItem::Playlist(collection) => {
                &collection.provider
            }
            MediaItem::User(user) => &user.provider,
            MediaItem::LibraryItem(item) => item.media_item.provider(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MediaItem::Track(track) => &track.name,
            MediaItem::Artist(artist) => &artist.name,
            MediaItem::Album(collection) | MediaItem::Playlist(collection) => &collection.name,
            MediaItem::User(user) => &user.name,
            MediaItem::LibraryItem(item) => item.media_item.name(),
        }
    }

    /// Decoded URI, when the provider uses the canonical format.
    pub fn parsed_uri(&self) -> Result<MediaUri> {
        MediaUri::parse(self.uri())
    }
}

impl Serialize for MediaItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MediaItem::Track(track) => track.serialize(serializer),
            MediaItem::Artist(artist) => artist.serialize(serializer),
            MediaItem::Album(collection) | MediaItem::Playlist(collection) => {
                collection.serialize(serializer)
            }
            MediaItem::User(user) => user.serialize(serializer),
            MediaItem::LibraryItem(item) => item.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MediaItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MediaItem::from_json(value).map_err(serde::de::Error::custom)
    }
}

impl From<Track> for MediaItem {
    fn from(track: Track) -> Self {
        MediaItem::Track(track)
    }
}

impl From<Artist> for MediaItem {
    fn from(artist: Artist) -> Self {
        MediaItem::Artist(artist)
    }
}

impl From<TrackCollection> for MediaItem {
    fn from(collection: TrackCollection) -> Self {
        if collection.media_type == MediaType::Playlist {
            MediaItem::Playlist(collection)
        } else {
            MediaItem::Album(collection)
        }
    }
}

impl From<UserAccount> for MediaItem {
    fn from(user: UserAccount) -> Self {
        MediaItem::User(user)
    }
}

impl From<LibraryItem> for MediaItem {
    fn from(item: LibraryItem) -> Self {
        MediaItem::LibraryItem(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track_json() -> Value {
        json!({
            "type": "track",
            "uri": "spotify:track:1",
            "provider": "spotify",
            "name": "Windowlicker",
            "albumName": "Windowlicker",
            "albumUri": "spotify:album:9",
            "artists": [
                { "uri": "spotify:artist:a", "provider": "spotify", "name": "Aphex Twin" }
            ],
            "duration": 367.5,
            "trackNumber": 1,
            "popularity": 61
        })
    }

    #[test]
    fn test_track_from_json_collects_extra_fields() {
        let item = MediaItem::from_json(track_json()).unwrap();
        let MediaItem::Track(track) = &item else {
            panic!("expected a track");
        };

        assert_eq!(track.name, "Windowlicker");
        assert_eq!(track.artists[0].media_type, MediaType::Artist);
        assert!(track.playable);
        assert_eq!(track.extra.get("popularity"), Some(&json!(61)));
        assert_eq!(item.uri(), "spotify:track:1");
        assert_eq!(item.provider(), "spotify");
        assert!(track.validate().is_ok());
    }

    #[test]
    fn test_track_json_round_trip_keeps_extra() {
        let item = MediaItem::from_json(track_json()).unwrap();
        let json = item.to_json().unwrap();
        assert_eq!(json["popularity"], 61);
        assert_eq!(json["type"], "track");
        assert_eq!(MediaItem::from_json(json).unwrap(), item);
    }

    #[test]
    fn test_label_resolves_to_artist_variant() {
        let item = MediaItem::from_json(json!({
            "type": "label",
            "uri": "bandcamp:label:warp",
            "provider": "bandcamp",
            "name": "Warp"
        }))
        .unwrap();

        assert!(matches!(item, MediaItem::Artist(_)));
        assert_eq!(item.media_type(), MediaType::Label);
    }

    #[test]
    fn test_collection_indexed_items() {
        let mut album = TrackCollection::new(MediaType::Album, "spotify:album:9", "spotify", "Album");
        album.items_offset = 10;
        album.items = vec![
            TrackCollectionItem {
                track: Track::new("spotify:track:1", "spotify", "One"),
                added_at: None,
                added_by: None,
            },
            TrackCollectionItem {
                track: Track::new("spotify:track:2", "spotify", "Two"),
                added_at: None,
                added_by: None,
            },
        ];

        let indices: Vec<usize> = album.indexed_items().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![10, 11]);
        assert!(album.validate().is_ok());
        assert!(matches!(MediaItem::from(album), MediaItem::Album(_)));
    }

    #[test]
    fn test_library_item_nested_media_item() {
        let item = MediaItem::from_json(json!({
            "type": "libraryItem",
            "libraryProvider": "spotify",
            "addedAt": "2021-04-01T00:00:00Z",
            "mediaItem": track_json()
        }))
        .unwrap();

        let MediaItem::LibraryItem(library_item) = &item else {
            panic!("expected a library item");
        };
        assert_eq!(library_item.library_provider, "spotify");
        assert_eq!(item.uri(), "spotify:track:1");
        assert!(library_item.validate().is_ok());
    }

    #[test]
    fn test_library_item_rejects_artist() {
        let item = LibraryItem::new(
            "spotify",
            Artist::new("spotify:artist:a", "spotify", "Aphex Twin").into(),
        );
        assert!(matches!(item.validate(), Err(MediaError::InvalidItem(_))));
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            MediaItem::from_json(json!({ "uri": "x" })),
            Err(MediaError::InvalidItem(_))
        ));
        assert!(matches!(
            MediaItem::from_json(json!({ "type": "bogus" })),
            Err(MediaError::UnknownType(_))
        ));
        assert!(matches!(
            MediaItem::from_json(json!({ "type": "track", "uri": "x" })),
            Err(MediaError::InvalidItem(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_identity() {
        let track = Track::new("", "spotify", "Untitled");
        assert!(track.validate().is_err());

        let mut track = Track::new("spotify:track:1", "spotify", "Untitled");
        track.duration = Some(-1.0);
        assert!(track.validate().is_err());
    }

    #[test]
    fn test_validate_checks_uri_against_identity() {
        let track = Track::new("x", "providerA", "Untitled");
        assert!(matches!(track.validate(), Err(MediaError::InvalidUri { .. })));

        let track = Track::new("providerB:track:9", "providerA", "Untitled");
        assert!(matches!(track.validate(), Err(MediaError::InvalidUri { .. })));

        let track = Track::new("providerA:album:9", "providerA", "Untitled");
        assert!(matches!(track.validate(), Err(MediaError::InvalidUri { .. })));

        let label = Artist {
            media_type: MediaType::Label,
            ..Artist::new("bandcamp:artist:warp", "bandcamp", "Warp")
        };
        assert!(label.validate().is_err());

        let nested = LibraryItem::new(
            "providerA",
            Track::new("providerA:playlist:1", "providerA", "Mislabelled").into(),
        );
        assert!(matches!(nested.validate(), Err(MediaError::InvalidUri { .. })));
    }

    #[test]
    fn test_validate_allows_name_only_artist() {
        let mut track = Track::new("bandcamp:track:1", "bandcamp", "Untitled");
        track.artists.push(Artist::new("", "", "Somebody"));
        assert!(track.validate().is_ok());

        let mut user = Artist::new("bandcamp:user:1", "bandcamp", "Someone");
        user.media_type = MediaType::User;
        track.artists.push(user);
        assert!(track.validate().is_err());
    }
}
