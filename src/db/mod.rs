//! Catalog persistence for tracks and albums.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. The rest of the
//! crate talks to the catalog through [`CatalogRepository`], so scans and
//! streams receive their store explicitly instead of reaching for a global.
//!
//! All mutations go through [`CatalogRepository::apply_changes`], which runs
//! a whole change list inside one transaction: readers see either the
//! previous catalog or the complete new one.
//!
//! # Example
//!
//! ```ignore
//! use tunedex::db::{init_db, SqliteCatalog, CatalogRepository};
//!
//! let pool = init_db("sqlite:tunedex.db").await?;
//! let catalog = SqliteCatalog::new(pool);
//! let tracks = catalog.all_tracks().await?;
//! ```

use async_trait::async_trait;
use serde::Serialize;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, Transaction};

use crate::error::{Result, ResultExt};
use crate::model::{Album, AlbumCandidate, AlbumWithTracks, SearchResults, Track, TrackCandidate};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "tunedex.db";

/// Search terms beyond this many are ignored.
pub const SEARCH_MAX_TOKENS: usize = 10;
/// Maximum tracks returned by a search.
pub const SEARCH_TRACK_LIMIT: u32 = 30;
/// Maximum albums returned by a search.
pub const SEARCH_ALBUM_LIMIT: u32 = 10;

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist and creates the schema on
/// first use; later calls find the migrations already applied.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        tracing::info!(target: "db", url = db_url, "Creating catalog database");
        Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Open the catalog database at `path`, creating it if needed.
pub async fn open_catalog(path: &std::path::Path) -> Result<SqliteCatalog> {
    let pool = init_db(&db_url(Some(path)))
        .await
        .with_context(format!("opening catalog {}", path.display()))?;
    Ok(SqliteCatalog::new(pool))
}

/// One mutation in a catalog change list.
#[derive(Debug, Clone, Copy)]
pub enum CatalogChange<'a> {
    /// Remove a track by ID
    DeleteTrack(&'a Track),
    /// Insert or replace the track with this filename, resolving its album
    UpsertTrack(&'a TrackCandidate),
    /// Delete every album no track references
    PruneOrphanAlbums,
}

/// What a committed change list did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeStats {
    pub tracks_deleted: usize,
    pub tracks_written: usize,
    pub albums_pruned: usize,
}

/// Persisted catalog of tracks and albums.
///
/// Implementations need not be safe for concurrent writers; the
/// reconciler is the only caller of [`apply_changes`](Self::apply_changes).
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn all_tracks(&self) -> Result<Vec<Track>>;

    async fn all_albums(&self) -> Result<Vec<Album>>;

    async fn track_by_id(&self, id: i64) -> Result<Option<Track>>;

    async fn track_by_filename(&self, filename: &str) -> Result<Option<Track>>;

    async fn album_by_key(&self, artist: &str, title: &str) -> Result<Option<Album>>;

    async fn tracks_for_album(&self, album_id: i64) -> Result<Vec<Track>>;

    async fn album_by_id(&self, id: i64) -> Result<Option<Album>>;

    /// The album and its tracks ordered by track number.
    async fn album_with_tracks(&self, id: i64) -> Result<Option<AlbumWithTracks>> {
        let Some(album) = self.album_by_id(id).await? else {
            return Ok(None);
        };
        let tracks = self.tracks_for_album(id).await?;
        Ok(Some(AlbumWithTracks { album, tracks }))
    }

    /// Cover art path of album `id`; `None` if the album is unknown or has
    /// no cover.
    async fn album_cover(&self, id: i64) -> Result<Option<String>> {
        Ok(self.album_by_id(id).await?.and_then(|album| album.cover_art))
    }

    /// Distinct album artists sorting strictly after `start`, in order.
    ///
    /// Artists with only non-album tracks are not listed.
    async fn artists_after(&self, start: &str, limit: u32) -> Result<Vec<String>>;

    /// An artist's albums, ordered by title then release date.
    async fn albums_by_artist(&self, artist: &str) -> Result<Vec<Album>>;

    /// Tracks and albums whose artist or title contains every
    /// whitespace-separated term of `query`.
    ///
    /// At most [`SEARCH_MAX_TOKENS`] terms are used; results are capped at
    /// [`SEARCH_TRACK_LIMIT`] tracks and [`SEARCH_ALBUM_LIMIT`] albums.
    async fn search(&self, query: &str) -> Result<SearchResults>;

    /// Apply `changes` in order as a single atomic unit.
    ///
    /// Albums referenced by upserted tracks are resolved get-or-create on
    /// their (artist, title) key, so at most one album exists per key.
    async fn apply_changes(&self, changes: &[CatalogChange<'_>]) -> Result<ChangeStats>;
}

/// SQLite-backed catalog.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

const TRACK_COLUMNS: &str = "id, artist, title, filename, track_number, album_id, mtime";
const ALBUM_COLUMNS: &str = "id, artist, title, release_date, label, catalog_number, cover_art";

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All tracks with their album title, ordered for display.
    pub async fn list_tracks(&self) -> Result<Vec<TrackListing>> {
        let rows = sqlx::query_as::<_, TrackListing>(
            r#"
            SELECT
                t.id, t.artist, t.title, t.filename, t.track_number,
                al.title AS album_title
            FROM tracks t
            LEFT JOIN albums al ON t.album_id = al.id
            ORDER BY t.artist, al.title, t.track_number, t.title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Track with its album title joined in.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TrackListing {
    pub id: i64,
    pub artist: String,
    pub title: String,
    pub filename: String,
    pub track_number: i64,
    pub album_title: Option<String>,
}

/// Split a search query into at most [`SEARCH_MAX_TOKENS`] terms.
pub fn search_tokens(query: &str) -> Vec<&str> {
    query.split_whitespace().take(SEARCH_MAX_TOKENS).collect()
}

/// `LIKE` pattern matching `term` anywhere, with wildcards escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// `SELECT {columns} FROM {table}` filtered so every term matches the
/// artist or the title.
fn search_query<'a>(
    columns: &str,
    table: &str,
    tokens: &[&str],
    limit: u32,
) -> QueryBuilder<'a, Sqlite> {
    let mut query = QueryBuilder::new(format!("SELECT {columns} FROM {table}"));
    for (i, token) in tokens.iter().enumerate() {
        query.push(if i == 0 { " WHERE " } else { " AND " });
        let pattern = contains_pattern(token);
        query
            .push("(artist LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR title LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    query.push(" ORDER BY artist, title LIMIT ").push_bind(limit);
    query
}

/// Get or create an album by its (artist, title) key.
///
/// An existing album keeps its fields; cover art, label and catalog number
/// are only filled in where they were missing.
async fn get_or_create_album(
    tx: &mut Transaction<'_, Sqlite>,
    album: &AlbumCandidate,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO albums (artist, title, release_date, label, catalog_number, cover_art)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(artist, title) DO UPDATE SET
            cover_art = COALESCE(albums.cover_art, excluded.cover_art),
            label = COALESCE(albums.label, excluded.label),
            catalog_number = COALESCE(albums.catalog_number, excluded.catalog_number)
        RETURNING id
        "#,
    )
    .bind(&album.artist)
    .bind(&album.title)
    .bind(&album.release_date)
    .bind(&album.label)
    .bind(&album.catalog_number)
    .bind(&album.cover_art)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0)
}

/// Insert or update a track keyed on its filename.
async fn upsert_track(
    tx: &mut Transaction<'_, Sqlite>,
    track: &TrackCandidate,
    album_id: Option<i64>,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tracks (artist, title, filename, track_number, album_id, mtime)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(filename) DO UPDATE SET
            artist = excluded.artist,
            title = excluded.title,
            track_number = excluded.track_number,
            album_id = excluded.album_id,
            mtime = excluded.mtime
        RETURNING id
        "#,
    )
    .bind(&track.artist)
    .bind(&track.title)
    .bind(&track.filename)
    .bind(track.track_number)
    .bind(album_id)
    .bind(track.mtime)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0)
}

#[async_trait]
impl CatalogRepository for SqliteCatalog {
    async fn all_tracks(&self) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY filename"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(tracks)
    }

    async fn all_albums(&self) -> Result<Vec<Album>> {
        let albums = sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums ORDER BY artist, title"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(albums)
    }

    async fn track_by_id(&self, id: i64) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(track)
    }

    async fn track_by_filename(&self, filename: &str) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE filename = ?"
        ))
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        Ok(track)
    }

    async fn album_by_key(&self, artist: &str, title: &str) -> Result<Option<Album>> {
        let album = sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE artist = ? AND title = ?"
        ))
        .bind(artist)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(album)
    }

    async fn tracks_for_album(&self, album_id: i64) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as::<_, Track>(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE album_id = ? ORDER BY track_number, title"
        ))
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tracks)
    }

    async fn album_by_id(&self, id: i64) -> Result<Option<Album>> {
        let album = sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(album)
    }

    async fn artists_after(&self, start: &str, limit: u32) -> Result<Vec<String>> {
        let artists: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT artist FROM albums WHERE artist > ? ORDER BY artist LIMIT ?",
        )
        .bind(start)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(artists.into_iter().map(|(artist,)| artist).collect())
    }

    async fn albums_by_artist(&self, artist: &str) -> Result<Vec<Album>> {
        let albums = sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE artist = ? ORDER BY title, release_date"
        ))
        .bind(artist)
        .fetch_all(&self.pool)
        .await?;
        Ok(albums)
    }

    async fn search(&self, query: &str) -> Result<SearchResults> {
        let tokens = search_tokens(query);

        let albums = search_query(ALBUM_COLUMNS, "albums", &tokens, SEARCH_ALBUM_LIMIT)
            .build_query_as::<Album>()
            .fetch_all(&self.pool)
            .await?;
        let tracks = search_query(TRACK_COLUMNS, "tracks", &tokens, SEARCH_TRACK_LIMIT)
            .build_query_as::<Track>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(
            target: "db",
            terms = tokens.len(),
            albums = albums.len(),
            tracks = tracks.len(),
            "Searched catalog"
        );
        Ok(SearchResults { albums, tracks })
    }

    async fn apply_changes(&self, changes: &[CatalogChange<'_>]) -> Result<ChangeStats> {
        let mut tx = self.pool.begin().await?;
        let mut stats = ChangeStats::default();

        // Any error returns early and drops `tx`, which rolls back.
        for change in changes {
            match change {
                CatalogChange::DeleteTrack(track) => {
                    let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
                        .bind(track.id)
                        .execute(&mut *tx)
                        .await?;
                    stats.tracks_deleted += result.rows_affected() as usize;
                }
                CatalogChange::UpsertTrack(candidate) => {
                    let album_id = match &candidate.album {
                        Some(album) => Some(get_or_create_album(&mut tx, album).await?),
                        None => None,
                    };
                    upsert_track(&mut tx, candidate, album_id).await?;
                    stats.tracks_written += 1;
                }
                CatalogChange::PruneOrphanAlbums => {
                    let result = sqlx::query(
                        r#"
                        DELETE FROM albums WHERE id NOT IN (
                            SELECT album_id FROM tracks WHERE album_id IS NOT NULL
                        )
                        "#,
                    )
                    .execute(&mut *tx)
                    .await?;
                    stats.albums_pruned += result.rows_affected() as usize;
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(
            target: "db",
            deleted = stats.tracks_deleted,
            written = stats.tracks_written,
            pruned = stats.albums_pruned,
            "Committed catalog changes"
        );
        Ok(stats)
    }
}
