// Folder-layout ingestion over the library_files table

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use cratedig_core::domain::{IngestionInput, IngestionStats};
use cratedig_core::error::Result;
use cratedig_core::port::{LibraryIngestion, TimeProvider};
use sqlx::{Connection, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Artist, album and title derived from a file's place in the library tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLayout {
    pub artist: String,
    pub album: String,
    pub title: String,
}

/// Reads `<root>/<Artist>/<Album>/<track>`. Missing levels fall back to the
/// unknown artist/album; deeper folders are ignored. `None` when `path` is not
/// under `root`.
pub fn layout_of(root: &Path, path: &Path) -> Option<TrackLayout> {
    let relative = path.strip_prefix(root).ok()?;
    let title = relative.file_stem()?.to_string_lossy().into_owned();

    let mut folders = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        });

    Some(TrackLayout {
        artist: folders.next().unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        album: folders.next().unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        title,
    })
}

/// Reference `LibraryIngestion`
///
/// Builds artists, albums and tracks from the folder layout of persisted files
/// and marks each ingested file processed. One transaction per run, one
/// savepoint per file: a file that fails is rolled back on its own, counted in
/// `errors` and left unprocessed for the next run.
pub struct SqliteLayoutIngestion {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteLayoutIngestion {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Returns the number of artists and albums it created
    async fn ingest_file(
        &self,
        conn: &mut SqliteConnection,
        input: &IngestionInput,
        file_id: i64,
        layout: &TrackLayout,
    ) -> Result<(u64, u64)> {
        let inserted = sqlx::query(
            "INSERT INTO artists (library_id, name) VALUES (?, ?) ON CONFLICT(library_id, name) DO NOTHING",
        )
        .bind(&input.library_id)
        .bind(&layout.artist)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
        let added_artists = inserted.rows_affected();

        let artist_id: i64 =
            sqlx::query_scalar("SELECT id FROM artists WHERE library_id = ? AND name = ?")
                .bind(&input.library_id)
                .bind(&layout.artist)
                .fetch_one(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;

        let inserted = sqlx::query(
            "INSERT INTO albums (artist_id, title) VALUES (?, ?) ON CONFLICT(artist_id, title) DO NOTHING",
        )
        .bind(artist_id)
        .bind(&layout.album)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
        let added_albums = inserted.rows_affected();

        let album_id: i64 =
            sqlx::query_scalar("SELECT id FROM albums WHERE artist_id = ? AND title = ?")
                .bind(artist_id)
                .bind(&layout.album)
                .fetch_one(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO tracks (library_id, file_id, album_id, title, added_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                album_id = excluded.album_id,
                title = excluded.title
            "#,
        )
        .bind(&input.library_id)
        .bind(file_id)
        .bind(album_id)
        .bind(&layout.title)
        .bind(&input.user_id)
        .bind(self.time_provider.now_millis())
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("UPDATE library_files SET processed = 1 WHERE id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok((added_artists, added_albums))
    }
}

#[async_trait]
impl LibraryIngestion for SqliteLayoutIngestion {
    async fn run(&self, input: &IngestionInput) -> Result<IngestionStats> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let tracks_before = count_tracks(&mut tx, &input.library_id).await?;

        let files: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, path FROM library_files
            WHERE library_id = ? AND (processed = 0 OR ? = 0)
            ORDER BY path
            "#,
        )
        .bind(&input.library_id)
        .bind(input.process_only_unprocessed)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut stats = IngestionStats::default();
        for (file_id, path) in files {
            stats.scanned_files += 1;
            match layout_of(&input.library_path, Path::new(&path)) {
                Some(layout) => {
                    let mut savepoint = tx.begin().await.map_err(map_sqlx_error)?;
                    match self.ingest_file(&mut savepoint, input, file_id, &layout).await {
                        Ok((artists, albums)) => {
                            savepoint.commit().await.map_err(map_sqlx_error)?;
                            stats.added_artists += artists;
                            stats.added_albums += albums;
                        }
                        Err(e) => {
                            savepoint.rollback().await.map_err(map_sqlx_error)?;
                            warn!(path = %path, error = %e, "File ingestion failed, left unprocessed");
                            stats.errors += 1;
                        }
                    }
                }
                None => {
                    debug!(path = %path, "File outside scan root, left for its own scan");
                    stats.skipped_files += 1;
                }
            }
        }

        // Track upserts report a row either way, so count the difference
        stats.added_tracks = count_tracks(&mut tx, &input.library_id)
            .await?
            .saturating_sub(tracks_before);

        tx.commit().await.map_err(map_sqlx_error)?;

        info!(
            library_id = %input.library_id,
            scanned_files = stats.scanned_files,
            added_tracks = stats.added_tracks,
            added_artists = stats.added_artists,
            added_albums = stats.added_albums,
            skipped_files = stats.skipped_files,
            errors = stats.errors,
            "Ingestion complete"
        );
        Ok(stats)
    }
}

async fn count_tracks(tx: &mut Transaction<'static, Sqlite>, library_id: &str) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE library_id = ?")
        .bind(library_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(u64::try_from(count).unwrap_or(0))
}
