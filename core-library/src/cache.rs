//! # Media Cache
//!
//! Durable, queryable store of normalized provider items.
//!
//! ## Overview
//!
//! All reads and writes run on a single worker task that owns the SQLite
//! connection, in the order they were submitted. Writes are batched into one
//! atomic transaction per call, together with the `dbState` stamps passed in
//! [`CacheOptions`], so a reader never sees a page of items without the sync
//! cursor that produced it, or the other way round.
//!
//! Reads always return the canonical JSON shape of [`core_media::MediaItem`],
//! whichever provider wrote the row.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::{CacheOptions, DatabaseConfig, MediaCache, PageRequest};
//!
//! let cache = MediaCache::new(DatabaseConfig::new("media.db"));
//! cache.open().await?;
//! cache.initialize(InitializeOptions::default()).await?;
//!
//! cache
//!     .cache_tracks(&tracks, CacheOptions::new().with_albums(true))
//!     .await?;
//! let page = cache
//!     .get_saved_tracks_json(PageRequest::new(0, 50), LibraryItemOptions::default())
//!     .await?;
//! ```

use crate::db::DatabaseConfig;
use crate::pagination::{Page, PageRequest};
use crate::schema;
use crate::sql::{
    self, JoinTable, SortOrder, TableSpec, WriteBatch, SAVED_ALBUM, SAVED_PLAYLIST, SAVED_TRACK,
    TRACK, TRACK_COLLECTION, TRACK_COLLECTION_ITEM,
};
use crate::transaction::{QueryResults, SqlTransaction, SqlValue, TransactionOptions};
use crate::transform;
use crate::worker::{Worker, WorkerHandle};
use crate::{LibraryError, Result};
use core_media::{Artist, LibraryItem, Track, TrackCollection};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Key/value stamps stored alongside cached rows.
pub type DbState = BTreeMap<String, String>;

/// Keeps `IN (...)` lists under the bound parameter limit.
const MAX_URIS_PER_STATEMENT: usize = 900;

type RowTransform = fn(Map<String, Value>) -> Result<Value>;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitializeOptions {
    /// Drop every table before creating the schema.
    pub purge: bool,
}

/// Options for the `cache_*` writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Also upsert the albums referenced by the written tracks.
    pub include_albums: bool,
    /// Stamps committed in the same transaction as the items.
    pub db_state: DbState,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_albums(mut self, include: bool) -> Self {
        self.include_albums = include;
        self
    }

    pub fn with_db_state(mut self, db_state: DbState) -> Self {
        self.db_state = db_state;
        self
    }

    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.db_state.insert(key.into(), value.into());
        self
    }
}

/// Filtering and ordering of saved-item reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryItemOptions {
    /// Only rows saved under this provider's library
    pub library_provider: Option<String>,
    pub order: SortOrder,
}

impl LibraryItemOptions {
    pub fn for_provider(library_provider: impl Into<String>) -> Self {
        Self {
            library_provider: Some(library_provider.into()),
            order: SortOrder::None,
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

/// Which saved-item table a library read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SavedKind {
    Tracks,
    Albums,
    Playlists,
}

impl SavedKind {
    fn table(self) -> &'static TableSpec {
        match self {
            SavedKind::Tracks => &SAVED_TRACK,
            SavedKind::Albums => &SAVED_ALBUM,
            SavedKind::Playlists => &SAVED_PLAYLIST,
        }
    }

    fn target(self) -> &'static TableSpec {
        match self {
            SavedKind::Tracks => &TRACK,
            SavedKind::Albums | SavedKind::Playlists => &TRACK_COLLECTION,
        }
    }

    fn transform(self) -> RowTransform {
        match self {
            SavedKind::Tracks => transform::transform_track,
            SavedKind::Albums | SavedKind::Playlists => transform::transform_track_collection,
        }
    }
}

fn take_rows(results: &mut QueryResults, key: &str) -> Vec<Value> {
    results.remove(key).unwrap_or_default()
}

fn take_total(results: &mut QueryResults, key: &str) -> u64 {
    take_rows(results, key)
        .first()
        .and_then(|row| row.get("total"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn uri_params<S: AsRef<str>>(uris: &[S]) -> Vec<SqlValue> {
    uris.iter().map(|uri| SqlValue::from(uri.as_ref())).collect()
}

// ============================================================================
// Media Cache
// ============================================================================

/// Transactional cache of provider items.
pub struct MediaCache {
    config: DatabaseConfig,
    worker: Mutex<Option<Worker>>,
    events: Option<EventBus>,
}

impl MediaCache {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            worker: Mutex::new(None),
            events: None,
        }
    }

    /// Publish [`LibraryEvent`]s on `bus` after each committed write.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub async fn is_open(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Open the store and start the worker. Opening an open cache is a no-op.
    ///
    /// # Errors
    ///
    /// [`LibraryError::Open`] when the store cannot be created or opened.
    #[instrument(skip(self), fields(location = %self.config.location()))]
    pub async fn open(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            debug!("Media cache already open");
            return Ok(());
        }
        *worker = Some(Worker::spawn(&self.config).await?);
        Ok(())
    }

    /// Stop the worker after the operations already queued. Closing a closed
    /// cache is a no-op.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let worker = self.worker.lock().await.take();
        match worker {
            Some(worker) => worker.shutdown().await,
            None => Ok(()),
        }
    }

    async fn handle(&self) -> Result<WorkerHandle> {
        self.worker
            .lock()
            .await
            .as_ref()
            .map(Worker::handle)
            .ok_or(LibraryError::Closed)
    }

    async fn execute(
        &self,
        transaction: SqlTransaction,
        options: TransactionOptions,
    ) -> Result<QueryResults> {
        let handle = self.handle().await?;
        if transaction.is_empty() {
            return Ok(QueryResults::new());
        }
        handle.execute(transaction, options).await
    }

    /// Reads run without a rollback boundary; the worker already keeps them
    /// from interleaving with writes.
    async fn read(&self, transaction: SqlTransaction) -> Result<QueryResults> {
        self.execute(transaction, TransactionOptions::non_atomic())
            .await
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Library(event));
        }
    }

    /// Build a transaction with `build` and run it on the worker.
    ///
    /// Returns the rows collected by the transaction's queries, per output
    /// key. Under [`TransactionOptions::atomic`] a failure leaves no partial
    /// writes behind. Without it, statements before the failing one stay
    /// applied.
    pub async fn transaction<F>(&self, build: F, options: TransactionOptions) -> Result<QueryResults>
    where
        F: FnOnce(&mut SqlTransaction) -> Result<()>,
    {
        let mut transaction = SqlTransaction::new();
        build(&mut transaction)?;
        self.execute(transaction, options).await
    }

    /// Create the schema if absent. With `purge` every table is dropped first.
    #[instrument(skip(self))]
    pub async fn initialize(&self, options: InitializeOptions) -> Result<()> {
        let mut transaction = SqlTransaction::new();
        schema::add_initialize(&mut transaction, options.purge);
        self.execute(transaction, TransactionOptions::default())
            .await?;
        info!(purge = options.purge, "Media cache schema ready");
        Ok(())
    }

    /// Purge and re-create the schema.
    pub async fn reset(&self) -> Result<()> {
        self.initialize(InitializeOptions { purge: true }).await?;
        self.emit(LibraryEvent::Reset);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    async fn write(
        &self,
        kind: &str,
        count: usize,
        mut batch: WriteBatch,
        options: &CacheOptions,
    ) -> Result<()> {
        batch.add_states(&options.db_state);
        if batch.is_empty() {
            return Ok(());
        }

        let mut transaction = SqlTransaction::new();
        batch.apply(&mut transaction);
        self.execute(transaction, TransactionOptions::default())
            .await?;

        debug!(kind, count, states = options.db_state.len(), "Cached items");
        if count > 0 {
            self.emit(LibraryEvent::ItemsCached {
                kind: kind.to_string(),
                count: count as u64,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, tracks, options), fields(count = tracks.len()))]
    pub async fn cache_tracks(&self, tracks: &[Track], options: CacheOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        for track in tracks {
            batch.add_track(track, options.include_albums)?;
        }
        self.write("tracks", tracks.len(), batch, &options).await
    }

    /// Upsert collection metadata. Items are written by
    /// [`cache_track_collection_items`](Self::cache_track_collection_items).
    #[instrument(skip(self, collections, options), fields(count = collections.len()))]
    pub async fn cache_track_collections(
        &self,
        collections: &[TrackCollection],
        options: CacheOptions,
    ) -> Result<()> {
        let mut batch = WriteBatch::new();
        for collection in collections {
            batch.add_collection(collection)?;
        }
        self.write("trackCollections", collections.len(), batch, &options)
            .await
    }

    /// Upsert a collection together with its loaded window of items. Stored
    /// items at or beyond the collection's `itemCount` are removed.
    #[instrument(skip(self, collection, options), fields(uri = %collection.uri, items = collection.items.len()))]
    pub async fn cache_track_collection_items(
        &self,
        collection: &TrackCollection,
        options: CacheOptions,
    ) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.add_collection_items(collection, options.include_albums)?;
        self.write(
            "trackCollectionItems",
            collection.items.len(),
            batch,
            &options,
        )
        .await
    }

    #[instrument(skip(self, artists, options), fields(count = artists.len()))]
    pub async fn cache_artists(&self, artists: &[Artist], options: CacheOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        for artist in artists {
            artist.validate()?;
            batch.add_artist(artist, &artist.provider)?;
        }
        self.write("artists", artists.len(), batch, &options).await
    }

    /// Upsert saved-library rows and the items they point at.
    #[instrument(skip(self, items, options), fields(count = items.len()))]
    pub async fn cache_library_items(
        &self,
        items: &[LibraryItem],
        options: CacheOptions,
    ) -> Result<()> {
        let mut batch = WriteBatch::new();
        for item in items {
            batch.add_library_item(item)?;
        }
        self.write("libraryItems", items.len(), batch, &options)
            .await
    }

    // ------------------------------------------------------------------------
    // Entity reads
    // ------------------------------------------------------------------------

    async fn select_by_uri<S: AsRef<str>>(
        &self,
        table: &str,
        uris: &[S],
        transform: RowTransform,
    ) -> Result<Vec<Option<Value>>> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }

        let mut transaction = SqlTransaction::new();
        for chunk in uris.chunks(MAX_URIS_PER_STATEMENT) {
            transaction.add_mapped_query(
                format!(
                    "SELECT * FROM {table} WHERE uri IN ({})",
                    sql::placeholders(chunk.len())
                ),
                uri_params(chunk),
                "rows",
                transform,
            );
        }

        let mut results = self.read(transaction).await?;
        let mut by_uri = HashMap::new();
        for value in take_rows(&mut results, "rows") {
            if let Some(uri) = value.get("uri").and_then(Value::as_str).map(str::to_owned) {
                by_uri.insert(uri, value);
            }
        }
        Ok(uris
            .iter()
            .map(|uri| by_uri.get(uri.as_ref()).cloned())
            .collect())
    }

    pub async fn get_track_json(&self, uri: &str) -> Result<Option<Value>> {
        Ok(self.get_tracks_json(&[uri]).await?.pop().flatten())
    }

    /// Tracks in request order, `None` where a uri is not cached.
    pub async fn get_tracks_json<S: AsRef<str>>(&self, uris: &[S]) -> Result<Vec<Option<Value>>> {
        self.select_by_uri(TRACK.name, uris, transform::transform_track)
            .await
    }

    pub async fn get_track_count(&self) -> Result<u64> {
        let mut transaction = SqlTransaction::new();
        transaction.add_query("SELECT count(*) AS total FROM Track", vec![], "count");
        let mut results = self.read(transaction).await?;
        Ok(take_total(&mut results, "count"))
    }

    pub async fn get_artist_json(&self, uri: &str) -> Result<Option<Value>> {
        Ok(self.get_artists_json(&[uri]).await?.pop().flatten())
    }

    /// Artists in request order, `None` where a uri is not cached.
    pub async fn get_artists_json<S: AsRef<str>>(
        &self,
        uris: &[S],
    ) -> Result<Vec<Option<Value>>> {
        self.select_by_uri(sql::ARTIST.name, uris, transform::transform_artist)
            .await
    }

    fn add_collection_items_query(
        transaction: &mut SqlTransaction,
        collection_uri: &str,
        range: PageRequest,
    ) {
        let tables = [
            JoinTable::new(&TRACK_COLLECTION_ITEM, "r1_"),
            JoinTable::new(&TRACK, "r2_"),
        ];
        transaction.add_query(
            format!(
                "SELECT {} FROM TrackCollectionItem JOIN Track ON Track.uri = TrackCollectionItem.trackURI \
                 WHERE TrackCollectionItem.collectionURI = ? \
                 AND TrackCollectionItem.indexNum >= ? AND TrackCollectionItem.indexNum < ? \
                 ORDER BY TrackCollectionItem.indexNum ASC",
                sql::joined_columns(&tables)
            ),
            vec![
                collection_uri.into(),
                range.sql_offset().into(),
                i64::try_from(range.end()).unwrap_or(i64::MAX).into(),
            ],
            "items",
        );
    }

    fn collect_items(rows: Vec<Value>) -> Result<BTreeMap<u64, Value>> {
        let tables = [
            JoinTable::new(&TRACK_COLLECTION_ITEM, "r1_"),
            JoinTable::new(&TRACK, "r2_"),
        ];
        let mut items = BTreeMap::new();
        for row in rows {
            let mut parts = transform::split_joined(&tables, into_object(row)).into_iter();
            let item = parts.next().unwrap_or_default();
            let track = parts.next().unwrap_or_default();
            let (index, value) = transform::transform_track_collection_item(item, track)?;
            items.insert(index, value);
        }
        Ok(items)
    }

    /// Collection metadata, optionally with a window of its items.
    ///
    /// The window starts at `items.offset` and stops at the first position
    /// not present in the cache, so `items[i]` is always at
    /// `itemsOffset + i`.
    #[instrument(skip(self))]
    pub async fn get_track_collection_json(
        &self,
        uri: &str,
        items: Option<PageRequest>,
    ) -> Result<Option<Value>> {
        let mut transaction = SqlTransaction::new();
        transaction.add_mapped_query(
            "SELECT * FROM TrackCollection WHERE uri = ?",
            vec![uri.into()],
            "collection",
            transform::transform_track_collection,
        );
        if let Some(range) = items {
            Self::add_collection_items_query(&mut transaction, uri, range);
        }

        let mut results = self.read(transaction).await?;
        let Some(mut collection) = take_rows(&mut results, "collection").into_iter().next()
        else {
            return Ok(None);
        };

        if let Some(range) = items {
            let stored = Self::collect_items(take_rows(&mut results, "items"))?;
            let window: Vec<Value> = stored
                .into_iter()
                .zip(range.offset..)
                .take_while(|((index, _), expected)| index == expected)
                .map(|((_, item), _)| item)
                .collect();

            if let Value::Object(object) = &mut collection {
                object.insert("itemsOffset".to_string(), Value::from(range.offset));
                object.insert("items".to_string(), Value::Array(window));
            }
        }
        Ok(Some(collection))
    }

    /// Cached items of a collection within `range`, keyed by position.
    #[instrument(skip(self))]
    pub async fn get_track_collection_items_json(
        &self,
        collection_uri: &str,
        range: PageRequest,
    ) -> Result<BTreeMap<u64, Value>> {
        let mut transaction = SqlTransaction::new();
        Self::add_collection_items_query(&mut transaction, collection_uri, range);
        let mut results = self.read(transaction).await?;
        Self::collect_items(take_rows(&mut results, "items"))
    }

    // ------------------------------------------------------------------------
    // Saved library
    // ------------------------------------------------------------------------

    async fn saved_count(&self, kind: SavedKind, options: &LibraryItemOptions) -> Result<u64> {
        let table = kind.table().name;
        let mut params = Vec::new();
        let filter =
            sql::library_provider_filter(table, options.library_provider.as_deref(), &mut params);

        let mut transaction = SqlTransaction::new();
        transaction.add_query(
            format!("SELECT count(*) AS total FROM {table}{filter}"),
            params,
            "count",
        );
        let mut results = self.read(transaction).await?;
        Ok(take_total(&mut results, "count"))
    }

    async fn saved_page(
        &self,
        kind: SavedKind,
        page: PageRequest,
        options: &LibraryItemOptions,
    ) -> Result<Page<Value>> {
        let table = kind.table().name;
        let target = kind.target().name;
        let tables = [
            JoinTable::new(kind.table(), "r1_"),
            JoinTable::new(kind.target(), "r2_"),
        ];
        let columns = sql::joined_columns(&tables);

        let mut params = Vec::new();
        let filter =
            sql::library_provider_filter(table, options.library_provider.as_deref(), &mut params);

        let mut transaction = SqlTransaction::new();
        transaction.add_query(
            format!("SELECT count(*) AS total FROM {table}{filter}"),
            params.clone(),
            "count",
        );

        params.push(page.limit().into());
        params.push(page.sql_offset().into());
        let transform_target = kind.transform();
        transaction.add_mapped_query(
            format!(
                "SELECT {columns} FROM {table} JOIN {target} ON {target}.uri = {table}.uri{filter} \
                 ORDER BY {} LIMIT ? OFFSET ?",
                options.order.order_by(table)
            ),
            params,
            "items",
            move |row| {
                let mut parts = transform::split_joined(&tables, row).into_iter();
                let saved = parts.next().unwrap_or_default();
                let media_item = transform_target(parts.next().unwrap_or_default())?;
                Ok(transform::transform_saved_item(saved, media_item))
            },
        );

        let mut results = self.read(transaction).await?;
        let total = take_total(&mut results, "count");
        Ok(Page::new(take_rows(&mut results, "items"), total, page.offset))
    }

    async fn has_saved<S: AsRef<str>>(
        &self,
        kind: SavedKind,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<Vec<bool>> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let table = kind.table().name;

        let mut transaction = SqlTransaction::new();
        for chunk in uris.chunks(MAX_URIS_PER_STATEMENT) {
            let mut params = uri_params(chunk);
            let mut sql = format!(
                "SELECT uri FROM {table} WHERE uri IN ({})",
                sql::placeholders(chunk.len())
            );
            if let Some(provider) = library_provider {
                sql.push_str(" AND libraryProvider = ?");
                params.push(provider.into());
            }
            transaction.add_query(sql, params, "saved");
        }

        let mut results = self.read(transaction).await?;
        let saved: HashSet<String> = take_rows(&mut results, "saved")
            .iter()
            .filter_map(|row| row.get("uri").and_then(Value::as_str).map(str::to_owned))
            .collect();
        Ok(uris.iter().map(|uri| saved.contains(uri.as_ref())).collect())
    }

    async fn delete_saved<S: AsRef<str>>(
        &self,
        kind: SavedKind,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<()> {
        let table = kind.table().name;
        let mut transaction = SqlTransaction::new();
        for chunk in uris.chunks(MAX_URIS_PER_STATEMENT) {
            let mut params = uri_params(chunk);
            let mut sql = format!(
                "DELETE FROM {table} WHERE uri IN ({})",
                sql::placeholders(chunk.len())
            );
            if let Some(provider) = library_provider {
                sql.push_str(" AND libraryProvider = ?");
                params.push(provider.into());
            }
            transaction.add_sql(sql, params);
        }
        self.execute(transaction, TransactionOptions::default())
            .await?;
        Ok(())
    }

    pub async fn get_saved_tracks_count(&self, options: LibraryItemOptions) -> Result<u64> {
        self.saved_count(SavedKind::Tracks, &options).await
    }

    /// Saved tracks in `page`, each `{libraryProvider, addedAt, updateTime, mediaItem}`.
    #[instrument(skip(self))]
    pub async fn get_saved_tracks_json(
        &self,
        page: PageRequest,
        options: LibraryItemOptions,
    ) -> Result<Page<Value>> {
        self.saved_page(SavedKind::Tracks, page, &options).await
    }

    pub async fn get_saved_albums_count(&self, options: LibraryItemOptions) -> Result<u64> {
        self.saved_count(SavedKind::Albums, &options).await
    }

    #[instrument(skip(self))]
    pub async fn get_saved_albums_json(
        &self,
        page: PageRequest,
        options: LibraryItemOptions,
    ) -> Result<Page<Value>> {
        self.saved_page(SavedKind::Albums, page, &options).await
    }

    pub async fn get_saved_playlists_count(&self, options: LibraryItemOptions) -> Result<u64> {
        self.saved_count(SavedKind::Playlists, &options).await
    }

    #[instrument(skip(self))]
    pub async fn get_saved_playlists_json(
        &self,
        page: PageRequest,
        options: LibraryItemOptions,
    ) -> Result<Page<Value>> {
        self.saved_page(SavedKind::Playlists, page, &options).await
    }

    pub async fn has_saved_tracks<S: AsRef<str>>(
        &self,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<Vec<bool>> {
        self.has_saved(SavedKind::Tracks, uris, library_provider)
            .await
    }

    pub async fn has_saved_albums<S: AsRef<str>>(
        &self,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<Vec<bool>> {
        self.has_saved(SavedKind::Albums, uris, library_provider)
            .await
    }

    pub async fn has_saved_playlists<S: AsRef<str>>(
        &self,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<Vec<bool>> {
        self.has_saved(SavedKind::Playlists, uris, library_provider)
            .await
    }

    pub async fn delete_saved_tracks<S: AsRef<str>>(
        &self,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<()> {
        self.delete_saved(SavedKind::Tracks, uris, library_provider)
            .await
    }

    pub async fn delete_saved_albums<S: AsRef<str>>(
        &self,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<()> {
        self.delete_saved(SavedKind::Albums, uris, library_provider)
            .await
    }

    pub async fn delete_saved_playlists<S: AsRef<str>>(
        &self,
        uris: &[S],
        library_provider: Option<&str>,
    ) -> Result<()> {
        self.delete_saved(SavedKind::Playlists, uris, library_provider)
            .await
    }

    /// Distinct artists of saved tracks, ordered by name.
    #[instrument(skip(self))]
    pub async fn get_library_artists_json(
        &self,
        page: PageRequest,
        options: LibraryItemOptions,
    ) -> Result<Page<Value>> {
        let mut params = Vec::new();
        let filter = sql::library_provider_filter(
            SAVED_TRACK.name,
            options.library_provider.as_deref(),
            &mut params,
        );
        let from = format!(
            "FROM Artist \
             JOIN TrackArtist ON TrackArtist.artistURI = Artist.uri \
             JOIN SavedTrack ON SavedTrack.uri = TrackArtist.trackURI{filter}"
        );

        let mut transaction = SqlTransaction::new();
        transaction.add_query(
            format!("SELECT count(DISTINCT Artist.uri) AS total {from}"),
            params.clone(),
            "count",
        );
        params.push(page.limit().into());
        params.push(page.sql_offset().into());
        transaction.add_mapped_query(
            format!(
                "SELECT DISTINCT Artist.* {from} \
                 ORDER BY Artist.name COLLATE NOCASE ASC, Artist.uri ASC LIMIT ? OFFSET ?"
            ),
            params,
            "artists",
            transform::transform_artist,
        );

        let mut results = self.read(transaction).await?;
        let total = take_total(&mut results, "count");
        Ok(Page::new(take_rows(&mut results, "artists"), total, page.offset))
    }

    // ------------------------------------------------------------------------
    // State stamps
    // ------------------------------------------------------------------------

    pub async fn set_state(&self, states: &DbState) -> Result<()> {
        let options = CacheOptions::new().with_db_state(states.clone());
        self.write("dbState", 0, WriteBatch::new(), &options).await
    }

    /// Stored values for `keys`. Missing keys are absent from the map.
    pub async fn get_state<S: AsRef<str>>(&self, keys: &[S]) -> Result<DbState> {
        if keys.is_empty() {
            return Ok(DbState::new());
        }

        let mut transaction = SqlTransaction::new();
        for chunk in keys.chunks(MAX_URIS_PER_STATEMENT) {
            transaction.add_query(
                format!(
                    "SELECT stateKey, stateValue FROM DBState WHERE stateKey IN ({})",
                    sql::placeholders(chunk.len())
                ),
                uri_params(chunk),
                "state",
            );
        }

        let mut results = self.read(transaction).await?;
        let mut state = DbState::new();
        for row in take_rows(&mut results, "state") {
            let key = row.get("stateKey").and_then(Value::as_str);
            let value = row.get("stateValue").and_then(Value::as_str);
            if let (Some(key), Some(value)) = (key, value) {
                state.insert(key.to_string(), value.to_string());
            }
        }
        Ok(state)
    }

    pub async fn get_state_value(&self, key: &str, default: &str) -> Result<String> {
        let mut state = self.get_state(&[key]).await?;
        Ok(state.remove(key).unwrap_or_else(|| default.to_string()))
    }
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("config", &self.config)
            .field("events", &self.events.is_some())
            .finish()
    }
}
