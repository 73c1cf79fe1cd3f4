//! # Media URIs
//!
//! Canonical `provider:type:id` identifiers.
//!
//! ## Format
//!
//! ```text
//! bandcamp:album:https%3A//artist.bandcamp.com/album/x
//! └──┬───┘ └─┬─┘ └──────────────┬─────────────────────┘
//! provider  type        id (escaped)
//! ```
//!
//! `provider` and `id` escape exactly two characters: `%` as `%25` and `:` as
//! `%3A`. Decoding splits at the first two colons, so an unescaped colon in the
//! id is still accepted. Any other `%` sequence is rejected, which keeps
//! `parse(uri.to_string()) == uri` for every value.

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Media Type
// ============================================================================

/// Kind of entity a URI points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaType {
    Track,
    Artist,
    /// Record label; stored and resolved like an artist
    Label,
    Album,
    Playlist,
    User,
    /// Membership of an entity in a user's saved library
    LibraryItem,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Track => "track",
            MediaType::Artist => "artist",
            MediaType::Label => "label",
            MediaType::Album => "album",
            MediaType::Playlist => "playlist",
            MediaType::User => "user",
            MediaType::LibraryItem => "libraryItem",
        }
    }

    /// Album or playlist.
    pub fn is_collection(&self) -> bool {
        matches!(self, MediaType::Album | MediaType::Playlist)
    }

    /// Artist or label.
    pub fn is_artist(&self) -> bool {
        matches!(self, MediaType::Artist | MediaType::Label)
    }
}

impl FromStr for MediaType {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "track" => Ok(MediaType::Track),
            "artist" => Ok(MediaType::Artist),
            "label" => Ok(MediaType::Label),
            "album" => Ok(MediaType::Album),
            "playlist" => Ok(MediaType::Playlist),
            "user" => Ok(MediaType::User),
            "libraryItem" => Ok(MediaType::LibraryItem),
            _ => Err(MediaError::UnknownType(s.to_string())),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Media URI
// ============================================================================

/// Decoded `(provider, type, id)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaUri {
    provider: String,
    media_type: MediaType,
    id: String,
}

impl MediaUri {
    /// Build a URI from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidUri`] if `provider` or `id` is empty.
    pub fn new(
        provider: impl Into<String>,
        media_type: MediaType,
        id: impl Into<String>,
    ) -> Result<Self> {
        let provider = provider.into();
        let id = id.into();
        if provider.is_empty() {
            return Err(MediaError::invalid_uri(&id, "provider is empty"));
        }
        if id.is_empty() {
            return Err(MediaError::invalid_uri(&provider, "id is empty"));
        }
        Ok(Self {
            provider,
            media_type,
            id,
        })
    }

    /// Decode a canonical URI string.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::InvalidUri`] for a missing segment, an empty
    /// provider or id, a malformed escape, or an unknown type.
    pub fn parse(uri: &str) -> Result<Self> {
        let mut parts = uri.splitn(3, ':');
        let (Some(provider), Some(media_type), Some(id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(MediaError::invalid_uri(uri, "expected provider:type:id"));
        };

        let media_type = media_type
            .parse::<MediaType>()
            .map_err(|_| MediaError::invalid_uri(uri, format!("unknown type '{}'", media_type)))?;
        let provider = unescape(uri, provider)?;
        let id = unescape(uri, id)?;

        if provider.is_empty() {
            return Err(MediaError::invalid_uri(uri, "provider is empty"));
        }
        if id.is_empty() {
            return Err(MediaError::invalid_uri(uri, "id is empty"));
        }

        Ok(Self {
            provider,
            media_type,
            id,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for MediaUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            escape(&self.provider),
            self.media_type,
            escape(&self.id)
        )
    }
}

impl FromStr for MediaUri {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MediaUri {
    type Error = MediaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MediaUri> for String {
    fn from(uri: MediaUri) -> Self {
        uri.to_string()
    }
}

fn escape(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

fn unescape(uri: &str, segment: &str) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(':'),
            _ => {
                return Err(MediaError::invalid_uri(
                    uri,
                    format!("invalid escape '%{}'", code),
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strings() {
        for media_type in [
            MediaType::Track,
            MediaType::Artist,
            MediaType::Label,
            MediaType::Album,
            MediaType::Playlist,
            MediaType::User,
            MediaType::LibraryItem,
        ] {
            assert_eq!(media_type.as_str().parse::<MediaType>().unwrap(), media_type);
            assert_eq!(
                serde_json::to_value(media_type).unwrap(),
                serde_json::json!(media_type.as_str())
            );
        }
        assert!(matches!(
            "podcast".parse::<MediaType>(),
            Err(MediaError::UnknownType(_))
        ));
        assert!(MediaType::Label.is_artist());
        assert!(MediaType::Playlist.is_collection());
    }

    #[test]
    fn test_parse_simple_uri() {
        let uri = MediaUri::parse("spotify:track:4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(uri.provider(), "spotify");
        assert_eq!(uri.media_type(), MediaType::Track);
        assert_eq!(uri.id(), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(uri.to_string(), "spotify:track:4uLU6hMCjMI75M1A2tKUQC");
    }

    #[test]
    fn test_escaping_round_trip() {
        let uri = MediaUri::new(
            "bandcamp",
            MediaType::Album,
            "https://artist.bandcamp.com/album/100%-pure",
        )
        .unwrap();
        let encoded = uri.to_string();
        assert_eq!(
            encoded,
            "bandcamp:album:https%3A//artist.bandcamp.com/album/100%25-pure"
        );
        assert_eq!(MediaUri::parse(&encoded).unwrap(), uri);
    }

    #[test]
    fn test_unescaped_colon_in_id_is_tolerated() {
        let uri = MediaUri::parse("youtube:playlist:PL:abc").unwrap();
        assert_eq!(uri.id(), "PL:abc");
        assert_eq!(uri.to_string(), "youtube:playlist:PL%3Aabc");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "spotify",
            "spotify:track",
            ":track:123",
            "spotify:track:",
            "spotify:song:123",
            "spotify:track:50%off",
            "spotify:track:abc%2",
        ] {
            assert!(
                matches!(MediaUri::parse(bad), Err(MediaError::InvalidUri { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_new_rejects_empty_parts() {
        assert!(MediaUri::new("", MediaType::Track, "1").is_err());
        assert!(MediaUri::new("spotify", MediaType::Track, "").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let uri = MediaUri::new("lastfm", MediaType::User, "rj").unwrap();
        let json = serde_json::to_value(&uri).unwrap();
        assert_eq!(json, serde_json::json!("lastfm:user:rj"));

        let back: MediaUri = serde_json::from_value(json).unwrap();
        assert_eq!(back, uri);
        assert!(serde_json::from_value::<MediaUri>(serde_json::json!("nope")).is_err());
    }
}
