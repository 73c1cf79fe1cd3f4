//! # Media Object Model
//!
//! Canonical identifiers and value types shared by providers, the cache and
//! the synchronizer.
//!
//! ## Overview
//!
//! - [`MediaUri`] / [`MediaType`]: the `provider:type:id` codec
//! - [`MediaItem`]: track, artist, album, playlist, user account or library
//!   item, decoded from canonical JSON by its `type` field
//!
//! Items are immutable values created per request. The cache persists only
//! their JSON projection.
//!
//! ## Usage
//!
//! ```rust
//! use core_media::{MediaItem, MediaType, MediaUri};
//! use serde_json::json;
//!
//! let uri = MediaUri::parse("spotify:album:6dVIqQ8qmQ5GBnJ9shOYGE").unwrap();
//! assert_eq!(uri.media_type(), MediaType::Album);
//!
//! let item = MediaItem::from_json(json!({
//!     "type": "artist",
//!     "uri": "spotify:artist:6olE6TJLqED3rqDCT0FyPh",
//!     "provider": "spotify",
//!     "name": "Nirvana"
//! }))
//! .unwrap();
//! assert_eq!(item.provider(), "spotify");
//! ```

pub mod error;
pub mod item;
pub mod uri;

pub use error::{MediaError, Result};
pub use item::{
    Artist, Dimensions, Extra, Image, ImageSize, LibraryItem, MediaItem, Track, TrackCollection,
    TrackCollectionItem, UserAccount,
};
pub use uri::{MediaType, MediaUri};
