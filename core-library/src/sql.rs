//! Statement builders for cache writes and reads

use crate::schema::{
    ARTIST_TABLE, DB_STATE_TABLE, SAVED_ALBUM_TABLE, SAVED_PLAYLIST_TABLE, SAVED_TRACK_TABLE,
    TRACK_ARTIST_TABLE, TRACK_COLLECTION_ARTIST_TABLE, TRACK_COLLECTION_ITEM_TABLE,
    TRACK_COLLECTION_TABLE, TRACK_TABLE,
};
use crate::transaction::{SqlTransaction, SqlValue};
use crate::{LibraryError, Result};
use core_media::{Artist, Extra, LibraryItem, MediaItem, MediaType, Track, TrackCollection};
use std::collections::BTreeMap;

/// Keep every statement under SQLite's historical bound parameter limit.
const MAX_PARAMS_PER_STATEMENT: usize = 999;

// ============================================================================
// Table descriptions
// ============================================================================

/// Column layout and conflict policy of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    /// Written columns, in bind order
    pub columns: &'static [&'static str],
    /// Conflict target
    pub key: &'static [&'static str],
    /// Replaced on conflict
    pub overwrite: &'static [&'static str],
    /// Replaced on conflict only when the incoming value is not NULL
    pub coalesce: &'static [&'static str],
}

impl TableSpec {
    /// Columns available to readers, including the maintained `updateTime`.
    pub fn read_columns(&self) -> Vec<&'static str> {
        let mut columns = self.columns.to_vec();
        columns.push("updateTime");
        columns
    }

    /// Multi-row upsert for `rows` rows.
    pub fn upsert_sql(&self, rows: usize) -> String {
        let placeholders = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![placeholders.as_str(); rows].join(", ");

        let mut assignments: Vec<String> = self
            .overwrite
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        assignments.extend(
            self.coalesce
                .iter()
                .map(|c| format!("{c} = COALESCE(excluded.{c}, {c})")),
        );
        assignments.push("updateTime = CURRENT_TIMESTAMP".to_string());

        format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT({}) DO UPDATE SET {}",
            self.name,
            self.columns.join(", "),
            values,
            self.key.join(", "),
            assignments.join(", ")
        )
    }

    /// Queue upserts for `rows`, split to respect the parameter limit.
    pub fn add_upserts(&self, tx: &mut SqlTransaction, rows: Vec<Vec<SqlValue>>) {
        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / self.columns.len()).max(1);
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Vec<SqlValue>> = rows.by_ref().take(rows_per_statement).collect();
            let sql = self.upsert_sql(chunk.len());
            tx.add_sql(sql, chunk.into_iter().flatten().collect());
        }
    }
}

pub const ARTIST: TableSpec = TableSpec {
    name: ARTIST_TABLE,
    columns: &["uri", "provider", "type", "name", "images", "extra"],
    key: &["uri"],
    overwrite: &["provider", "type", "name"],
    coalesce: &["images", "extra"],
};

pub const TRACK_COLLECTION: TableSpec = TableSpec {
    name: TRACK_COLLECTION_TABLE,
    columns: &[
        "uri",
        "provider",
        "type",
        "name",
        "versionId",
        "itemCount",
        "artists",
        "images",
        "owner",
        "extra",
    ],
    key: &["uri"],
    overwrite: &["provider", "type", "name"],
    coalesce: &["versionId", "itemCount", "artists", "images", "owner", "extra"],
};

pub const TRACK_COLLECTION_ARTIST: TableSpec = TableSpec {
    name: TRACK_COLLECTION_ARTIST_TABLE,
    columns: &["collectionURI", "artistURI"],
    key: &["collectionURI", "artistURI"],
    overwrite: &[],
    coalesce: &[],
};

pub const TRACK: TableSpec = TableSpec {
    name: TRACK_TABLE,
    columns: &[
        "uri",
        "provider",
        "name",
        "albumName",
        "albumURI",
        "artists",
        "images",
        "duration",
        "trackNumber",
        "discNumber",
        "playable",
        "extra",
    ],
    key: &["uri"],
    overwrite: &["provider", "name", "playable"],
    coalesce: &[
        "albumName",
        "albumURI",
        "artists",
        "images",
        "duration",
        "trackNumber",
        "discNumber",
        "extra",
    ],
};

pub const TRACK_ARTIST: TableSpec = TableSpec {
    name: TRACK_ARTIST_TABLE,
    columns: &["trackURI", "artistURI"],
    key: &["trackURI", "artistURI"],
    overwrite: &[],
    coalesce: &[],
};

pub const TRACK_COLLECTION_ITEM: TableSpec = TableSpec {
    name: TRACK_COLLECTION_ITEM_TABLE,
    columns: &["collectionURI", "indexNum", "trackURI", "addedAt", "addedBy"],
    key: &["collectionURI", "indexNum"],
    overwrite: &["trackURI", "addedAt", "addedBy"],
    coalesce: &[],
};

const SAVED_COLUMNS: &[&str] = &["uri", "libraryProvider", "addedAt"];
const SAVED_KEY: &[&str] = &["uri", "libraryProvider"];

pub const SAVED_TRACK: TableSpec = TableSpec {
    name: SAVED_TRACK_TABLE,
    columns: SAVED_COLUMNS,
    key: SAVED_KEY,
    overwrite: &[],
    coalesce: &["addedAt"],
};

pub const SAVED_ALBUM: TableSpec = TableSpec {
    name: SAVED_ALBUM_TABLE,
    ..SAVED_TRACK
};

pub const SAVED_PLAYLIST: TableSpec = TableSpec {
    name: SAVED_PLAYLIST_TABLE,
    ..SAVED_TRACK
};

pub const DB_STATE: TableSpec = TableSpec {
    name: DB_STATE_TABLE,
    columns: &["stateKey", "stateValue"],
    key: &["stateKey"],
    overwrite: &["stateValue"],
    coalesce: &[],
};

/// Saved-item table for a library item's media type.
pub fn saved_table(media_type: MediaType) -> Option<&'static TableSpec> {
    match media_type {
        MediaType::Track => Some(&SAVED_TRACK),
        MediaType::Album => Some(&SAVED_ALBUM),
        MediaType::Playlist => Some(&SAVED_PLAYLIST),
        _ => None,
    }
}

// ============================================================================
// Writes
// ============================================================================

fn extra_param(extra: &Extra) -> Result<SqlValue> {
    if extra.is_empty() {
        Ok(SqlValue::Null)
    } else {
        SqlValue::json(extra)
    }
}

fn json_param<T: serde::Serialize>(value: Option<&T>) -> Result<SqlValue> {
    value.map(SqlValue::json).transpose().map(SqlValue::from)
}

/// Rows accumulated for one write, applied in dependency order.
#[derive(Debug, Default)]
pub struct WriteBatch {
    artists: Vec<Vec<SqlValue>>,
    collections: Vec<Vec<SqlValue>>,
    collection_artists: Vec<Vec<SqlValue>>,
    tracks: Vec<Vec<SqlValue>>,
    track_artists: Vec<Vec<SqlValue>>,
    item_truncations: Vec<(String, u64)>,
    collection_items: Vec<Vec<SqlValue>>,
    saved_tracks: Vec<Vec<SqlValue>>,
    saved_albums: Vec<Vec<SqlValue>>,
    saved_playlists: Vec<Vec<SqlValue>>,
    states: Vec<Vec<SqlValue>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.artists.is_empty()
            && self.collections.is_empty()
            && self.tracks.is_empty()
            && self.item_truncations.is_empty()
            && self.collection_items.is_empty()
            && self.saved_tracks.is_empty()
            && self.saved_albums.is_empty()
            && self.saved_playlists.is_empty()
            && self.states.is_empty()
    }

    /// Artist row. Artists without a uri are not linkable and are skipped.
    pub fn add_artist(&mut self, artist: &Artist, fallback_provider: &str) -> Result<bool> {
        if artist.uri.is_empty() {
            return Ok(false);
        }
        let provider = if artist.provider.is_empty() {
            fallback_provider
        } else {
            artist.provider.as_str()
        };
        self.artists.push(vec![
            artist.uri.as_str().into(),
            provider.into(),
            artist.media_type.as_str().into(),
            artist.name.as_str().into(),
            json_param(artist.images.as_ref())?,
            extra_param(&artist.extra)?,
        ]);
        Ok(true)
    }

    /// Track row plus its artist links. With `include_album` a partial album
    /// row is derived from the track, and the track is placed in it when its
    /// number is known.
    pub fn add_track(&mut self, track: &Track, include_album: bool) -> Result<()> {
        track.validate()?;

        for artist in &track.artists {
            if self.add_artist(artist, &track.provider)? {
                self.track_artists
                    .push(vec![track.uri.as_str().into(), artist.uri.as_str().into()]);
            }
        }

        self.tracks.push(vec![
            track.uri.as_str().into(),
            track.provider.as_str().into(),
            track.name.as_str().into(),
            track.album_name.as_deref().into(),
            track.album_uri.as_deref().into(),
            SqlValue::json(&track.artists)?,
            json_param(track.images.as_ref())?,
            track.duration.into(),
            track.track_number.into(),
            track.disc_number.into(),
            track.playable.into(),
            extra_param(&track.extra)?,
        ]);

        if include_album {
            if let (Some(album_uri), Some(album_name)) = (&track.album_uri, &track.album_name) {
                self.collections.push(vec![
                    album_uri.as_str().into(),
                    track.provider.as_str().into(),
                    MediaType::Album.as_str().into(),
                    album_name.as_str().into(),
                    SqlValue::Null,
                    SqlValue::Null,
                    SqlValue::Null,
                    SqlValue::Null,
                    SqlValue::Null,
                    SqlValue::Null,
                ]);
                if let Some(number) = track.track_number.filter(|n| *n >= 1) {
                    self.collection_items.push(vec![
                        album_uri.as_str().into(),
                        (number - 1).into(),
                        track.uri.as_str().into(),
                        SqlValue::Null,
                        SqlValue::Null,
                    ]);
                }
            }
        }
        Ok(())
    }

    /// Collection metadata row plus its artist links. Items are not written.
    pub fn add_collection(&mut self, collection: &TrackCollection) -> Result<()> {
        collection.validate()?;

        for artist in &collection.artists {
            if self.add_artist(artist, &collection.provider)? {
                self.collection_artists.push(vec![
                    collection.uri.as_str().into(),
                    artist.uri.as_str().into(),
                ]);
            }
        }

        self.collections.push(vec![
            collection.uri.as_str().into(),
            collection.provider.as_str().into(),
            collection.media_type.as_str().into(),
            collection.name.as_str().into(),
            collection.version_id.as_deref().into(),
            collection.item_count.into(),
            SqlValue::json(&collection.artists)?,
            json_param(collection.images.as_ref())?,
            json_param(collection.owner.as_ref())?,
            extra_param(&collection.extra)?,
        ]);
        Ok(())
    }

    /// Collection row plus the items of its loaded window. Stored items at or
    /// beyond `itemCount` are removed first.
    pub fn add_collection_items(
        &mut self,
        collection: &TrackCollection,
        include_track_albums: bool,
    ) -> Result<()> {
        self.add_collection(collection)?;

        if let Some(count) = collection.item_count {
            self.item_truncations.push((collection.uri.clone(), count));
        }

        for (index, item) in collection.indexed_items() {
            self.add_track(&item.track, include_track_albums)?;
            self.collection_items.push(vec![
                collection.uri.as_str().into(),
                index.into(),
                item.track.uri.as_str().into(),
                item.added_at.as_deref().into(),
                json_param(item.added_by.as_ref())?,
            ]);
        }
        Ok(())
    }

    /// Saved-item row plus the track or collection it points at.
    pub fn add_library_item(&mut self, item: &LibraryItem) -> Result<()> {
        item.validate()?;

        let (rows, uri) = match item.media_item.as_ref() {
            MediaItem::Track(track) => {
                self.add_track(track, true)?;
                (&mut self.saved_tracks, track.uri.as_str())
            }
            MediaItem::Album(album) => {
                self.add_collection(album)?;
                (&mut self.saved_albums, album.uri.as_str())
            }
            MediaItem::Playlist(playlist) => {
                self.add_collection(playlist)?;
                (&mut self.saved_playlists, playlist.uri.as_str())
            }
            other => {
                return Err(LibraryError::invalid_input(
                    "mediaItem",
                    format!("{} cannot be saved to a library", other.media_type()),
                ))
            }
        };

        rows.push(vec![
            uri.into(),
            item.library_provider.as_str().into(),
            item.added_at.as_deref().into(),
        ]);
        Ok(())
    }

    pub fn add_states(&mut self, states: &BTreeMap<String, String>) {
        for (key, value) in states {
            self.states
                .push(vec![key.as_str().into(), value.as_str().into()]);
        }
    }

    /// Queue every accumulated row on `tx`.
    pub fn apply(self, tx: &mut SqlTransaction) {
        ARTIST.add_upserts(tx, self.artists);
        TRACK_COLLECTION.add_upserts(tx, self.collections);
        TRACK_COLLECTION_ARTIST.add_upserts(tx, self.collection_artists);
        TRACK.add_upserts(tx, self.tracks);
        TRACK_ARTIST.add_upserts(tx, self.track_artists);

        for (collection_uri, count) in self.item_truncations {
            tx.add_sql(
                "DELETE FROM TrackCollectionItem WHERE collectionURI = ? AND indexNum >= ?",
                vec![collection_uri.into(), count.into()],
            );
        }
        TRACK_COLLECTION_ITEM.add_upserts(tx, self.collection_items);

        SAVED_TRACK.add_upserts(tx, self.saved_tracks);
        SAVED_ALBUM.add_upserts(tx, self.saved_albums);
        SAVED_PLAYLIST.add_upserts(tx, self.saved_playlists);

        DB_STATE.add_upserts(tx, self.states);
    }
}

// ============================================================================
// Reads
// ============================================================================

/// `?, ?, ?` for `count` parameters.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// One table of a joined select, with its column prefix.
#[derive(Debug, Clone)]
pub struct JoinTable {
    pub spec: &'static TableSpec,
    pub prefix: &'static str,
}

impl JoinTable {
    pub const fn new(spec: &'static TableSpec, prefix: &'static str) -> Self {
        Self { spec, prefix }
    }
}

/// `T.col AS p_col` for every readable column of every table.
pub fn joined_columns(tables: &[JoinTable]) -> String {
    tables
        .iter()
        .flat_map(|table| {
            table
                .spec
                .read_columns()
                .into_iter()
                .map(move |c| format!("{}.{} AS {}{}", table.spec.name, c, table.prefix, c))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ordering of saved-item reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Insertion order
    #[default]
    None,
    /// Oldest `addedAt` first
    Asc,
    /// Newest `addedAt` first
    Desc,
}

impl SortOrder {
    pub fn order_by(&self, table: &str) -> String {
        match self {
            SortOrder::None => format!("{table}.rowid ASC"),
            SortOrder::Asc => format!("{table}.addedAt ASC, {table}.rowid ASC"),
            SortOrder::Desc => format!("{table}.addedAt DESC, {table}.rowid ASC"),
        }
    }
}

/// `WHERE` fragment restricting saved rows to one library provider.
pub fn library_provider_filter(
    table: &str,
    library_provider: Option<&str>,
    params: &mut Vec<SqlValue>,
) -> String {
    match library_provider {
        Some(provider) => {
            params.push(provider.into());
            format!(" WHERE {table}.libraryProvider = ?")
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_media::TrackCollectionItem;

    fn track(uri: &str) -> Track {
        let mut track = Track::new(uri, "spotify", "Song");
        track.album_uri = Some("spotify:album:1".to_string());
        track.album_name = Some("Record".to_string());
        track.track_number = Some(3);
        track
            .artists
            .push(Artist::new("spotify:artist:1", "spotify", "Band"));
        track.artists.push(Artist::new("", "spotify", "Unlinked"));
        track
    }

    #[test]
    fn test_upsert_sql_merges_with_coalesce() {
        let sql = ARTIST.upsert_sql(2);
        assert!(sql.starts_with(
            "INSERT INTO Artist (uri, provider, type, name, images, extra) VALUES (?, ?, ?, ?, ?, ?), (?, ?, ?, ?, ?, ?)"
        ));
        assert!(sql.contains("ON CONFLICT(uri) DO UPDATE SET provider = excluded.provider"));
        assert!(sql.contains("images = COALESCE(excluded.images, images)"));
        assert!(sql.ends_with("updateTime = CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_upserts_are_chunked() {
        let mut tx = SqlTransaction::new();
        let rows: Vec<Vec<SqlValue>> = (0..400)
            .map(|i| vec![format!("k{i}").into(), "v".into()])
            .collect();
        DB_STATE.add_upserts(&mut tx, rows);

        // 999 / 2 columns = 499 rows per statement
        assert_eq!(tx.len(), 1);

        let mut tx = SqlTransaction::new();
        let rows: Vec<Vec<SqlValue>> = (0..200)
            .map(|i| {
                let mut row = vec![SqlValue::Null; TRACK.columns.len()];
                row[0] = format!("t{i}").into();
                row
            })
            .collect();
        TRACK.add_upserts(&mut tx, rows);
        // 999 / 12 columns = 83 rows per statement
        assert_eq!(tx.len(), 3);
        let params: usize = tx.statements().iter().map(|s| s.params.len()).sum();
        assert_eq!(params, 200 * TRACK.columns.len());
    }

    #[test]
    fn test_track_with_album_cascade() {
        let mut batch = WriteBatch::new();
        batch.add_track(&track("spotify:track:1"), true).unwrap();

        assert_eq!(batch.artists.len(), 1);
        assert_eq!(batch.track_artists.len(), 1);
        assert_eq!(batch.collections.len(), 1);
        assert_eq!(batch.collection_items.len(), 1);
        // trackNumber 3 lands at index 2
        assert_eq!(batch.collection_items[0][1], SqlValue::Integer(2));
    }

    #[test]
    fn test_track_without_album_cascade() {
        let mut batch = WriteBatch::new();
        batch.add_track(&track("spotify:track:1"), false).unwrap();
        assert!(batch.collections.is_empty());
        assert!(batch.collection_items.is_empty());
    }

    #[test]
    fn test_collection_items_use_absolute_index() {
        let mut album = TrackCollection::new(
            MediaType::Album,
            "spotify:album:1",
            "spotify",
            "Record",
        );
        album.item_count = Some(12);
        album.items_offset = 10;
        album.items = vec![
            TrackCollectionItem {
                track: Track::new("spotify:track:a", "spotify", "A"),
                added_at: None,
                added_by: None,
            },
            TrackCollectionItem {
                track: Track::new("spotify:track:b", "spotify", "B"),
                added_at: Some("2021-01-01T00:00:00Z".to_string()),
                added_by: None,
            },
        ];

        let mut batch = WriteBatch::new();
        batch.add_collection_items(&album, false).unwrap();
        assert_eq!(batch.item_truncations, vec![("spotify:album:1".to_string(), 12)]);
        assert_eq!(batch.collection_items[0][1], SqlValue::Integer(10));
        assert_eq!(batch.collection_items[1][1], SqlValue::Integer(11));
    }

    #[test]
    fn test_library_item_rejects_artist() {
        let artist = Artist::new("spotify:artist:1", "spotify", "Band");
        let item = LibraryItem::new("spotify", MediaItem::Artist(artist));
        let mut batch = WriteBatch::new();
        assert!(batch.add_library_item(&item).is_err());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_joined_columns_prefix() {
        let columns = joined_columns(&[JoinTable::new(&SAVED_TRACK, "r1_")]);
        assert_eq!(
            columns,
            "SavedTrack.uri AS r1_uri, SavedTrack.libraryProvider AS r1_libraryProvider, \
             SavedTrack.addedAt AS r1_addedAt, SavedTrack.updateTime AS r1_updateTime"
        );
    }

    #[test]
    fn test_sort_order() {
        assert_eq!(SortOrder::default().order_by("SavedTrack"), "SavedTrack.rowid ASC");
        assert_eq!(
            SortOrder::Desc.order_by("SavedAlbum"),
            "SavedAlbum.addedAt DESC, SavedAlbum.rowid ASC"
        );
    }
}
