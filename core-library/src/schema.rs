//! Cache schema: table definitions and purge order

use crate::transaction::SqlTransaction;

pub const ARTIST_TABLE: &str = "Artist";
pub const TRACK_COLLECTION_TABLE: &str = "TrackCollection";
pub const TRACK_COLLECTION_ARTIST_TABLE: &str = "TrackCollectionArtist";
pub const TRACK_TABLE: &str = "Track";
pub const TRACK_ARTIST_TABLE: &str = "TrackArtist";
pub const TRACK_COLLECTION_ITEM_TABLE: &str = "TrackCollectionItem";
pub const SAVED_TRACK_TABLE: &str = "SavedTrack";
pub const SAVED_ALBUM_TABLE: &str = "SavedAlbum";
pub const SAVED_PLAYLIST_TABLE: &str = "SavedPlaylist";
pub const DB_STATE_TABLE: &str = "DBState";

/// Creation order. Referenced tables come before the tables that point at them.
const CREATE_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS Artist (
        uri TEXT NOT NULL,
        provider TEXT NOT NULL,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        images TEXT,
        extra TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS TrackCollection (
        uri TEXT NOT NULL,
        provider TEXT NOT NULL,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        versionId TEXT,
        itemCount INTEGER,
        artists TEXT,
        images TEXT,
        owner TEXT,
        extra TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS TrackCollectionArtist (
        collectionURI TEXT NOT NULL,
        artistURI TEXT NOT NULL,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(collectionURI, artistURI),
        FOREIGN KEY(collectionURI) REFERENCES TrackCollection(uri),
        FOREIGN KEY(artistURI) REFERENCES Artist(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS Track (
        uri TEXT NOT NULL,
        provider TEXT NOT NULL,
        name TEXT NOT NULL,
        albumName TEXT,
        albumURI TEXT,
        artists TEXT,
        images TEXT,
        duration REAL,
        trackNumber INTEGER,
        discNumber INTEGER,
        playable INTEGER NOT NULL DEFAULT 1,
        extra TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS TrackArtist (
        trackURI TEXT NOT NULL,
        artistURI TEXT NOT NULL,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(trackURI, artistURI),
        FOREIGN KEY(trackURI) REFERENCES Track(uri),
        FOREIGN KEY(artistURI) REFERENCES Artist(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS TrackCollectionItem (
        collectionURI TEXT NOT NULL,
        indexNum INTEGER NOT NULL,
        trackURI TEXT NOT NULL,
        addedAt TEXT,
        addedBy TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(collectionURI, indexNum),
        FOREIGN KEY(collectionURI) REFERENCES TrackCollection(uri),
        FOREIGN KEY(trackURI) REFERENCES Track(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS SavedTrack (
        uri TEXT NOT NULL,
        libraryProvider TEXT NOT NULL,
        addedAt TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(uri, libraryProvider),
        FOREIGN KEY(uri) REFERENCES Track(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS SavedAlbum (
        uri TEXT NOT NULL,
        libraryProvider TEXT NOT NULL,
        addedAt TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(uri, libraryProvider),
        FOREIGN KEY(uri) REFERENCES TrackCollection(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS SavedPlaylist (
        uri TEXT NOT NULL,
        libraryProvider TEXT NOT NULL,
        addedAt TEXT,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(uri, libraryProvider),
        FOREIGN KEY(uri) REFERENCES TrackCollection(uri)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS DBState (
        stateKey TEXT NOT NULL,
        stateValue TEXT NOT NULL,
        updateTime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(stateKey)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_track_album ON Track(albumURI)",
    "CREATE INDEX IF NOT EXISTS idx_track_artist_artist ON TrackArtist(artistURI)",
    "CREATE INDEX IF NOT EXISTS idx_saved_track_provider ON SavedTrack(libraryProvider)",
    "CREATE INDEX IF NOT EXISTS idx_saved_album_provider ON SavedAlbum(libraryProvider)",
    "CREATE INDEX IF NOT EXISTS idx_saved_playlist_provider ON SavedPlaylist(libraryProvider)",
];

/// Drop order. Tables holding references go first.
pub const PURGE_ORDER: &[&str] = &[
    SAVED_PLAYLIST_TABLE,
    SAVED_ALBUM_TABLE,
    SAVED_TRACK_TABLE,
    TRACK_ARTIST_TABLE,
    TRACK_COLLECTION_ARTIST_TABLE,
    TRACK_COLLECTION_ITEM_TABLE,
    TRACK_TABLE,
    TRACK_COLLECTION_TABLE,
    ARTIST_TABLE,
    DB_STATE_TABLE,
];

/// Queue schema creation, optionally dropping every table first.
pub fn add_initialize(tx: &mut SqlTransaction, purge: bool) {
    if purge {
        for table in PURGE_ORDER {
            tx.add_sql(format!("DROP TABLE IF EXISTS {table}"), vec![]);
        }
    }
    for statement in CREATE_STATEMENTS {
        tx.add_sql(*statement, vec![]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_without_purge() {
        let mut tx = SqlTransaction::new();
        add_initialize(&mut tx, false);
        assert_eq!(tx.len(), CREATE_STATEMENTS.len());
        assert!(tx.statements().iter().all(|s| !s.sql.contains("DROP")));
    }

    #[test]
    fn test_purge_drops_every_table_first() {
        let mut tx = SqlTransaction::new();
        add_initialize(&mut tx, true);
        assert_eq!(tx.len(), PURGE_ORDER.len() + CREATE_STATEMENTS.len());
        assert_eq!(tx.statements()[0].sql, "DROP TABLE IF EXISTS SavedPlaylist");
        assert_eq!(
            tx.statements()[PURGE_ORDER.len() - 1].sql,
            "DROP TABLE IF EXISTS DBState"
        );
    }
}
