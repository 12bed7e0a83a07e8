// SQLite LibraryFileStore Implementation

use crate::error::{map_sqlx_error, to_db_count};
use async_trait::async_trait;
use cratedig_core::domain::FileEntry;
use cratedig_core::error::Result;
use cratedig_core::port::{LibraryFileStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

/// Upserts walker batches into `library_files`
///
/// A batch commits in one transaction. Rows are keyed by (library, path); a row
/// whose size or mtime changed is marked unprocessed again so ingestion picks it up.
pub struct SqliteLibraryFileStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteLibraryFileStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl LibraryFileStore for SqliteLibraryFileStore {
    async fn write_batch(&self, library_id: &str, entries: &[FileEntry]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO library_files (
                    library_id, path, size_bytes, mtime_ms, extension, processed,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, 0, ?, ?)
                ON CONFLICT(library_id, path) DO UPDATE SET
                    processed = CASE
                        WHEN library_files.size_bytes = excluded.size_bytes
                         AND library_files.mtime_ms = excluded.mtime_ms
                        THEN library_files.processed
                        ELSE 0
                    END,
                    size_bytes = excluded.size_bytes,
                    mtime_ms = excluded.mtime_ms,
                    extension = excluded.extension,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(library_id)
            .bind(entry.path.to_string_lossy().into_owned())
            .bind(to_db_count(entry.size_bytes))
            .bind(entry.mtime_ms)
            .bind(&entry.extension)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(library_id, files = entries.len(), "Batch committed");
        Ok(entries.len() as u64)
    }

    async fn count_files(&self, library_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM library_files WHERE library_id = ?")
            .bind(library_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use cratedig_core::port::time_provider::mocks::ManualTimeProvider;
    use std::path::PathBuf;

    async fn setup_test_db() -> (SqlitePool, SqliteLibraryFileStore) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SqliteLibraryFileStore::new(pool.clone(), Arc::new(ManualTimeProvider::new(1_000)));
        (pool, store)
    }

    fn entry(path: &str, size_bytes: u64, mtime_ms: i64) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            size_bytes,
            mtime_ms,
            extension: "mp3".to_string(),
        }
    }

    async fn processed_flags(pool: &SqlitePool) -> Vec<(String, bool)> {
        sqlx::query_as("SELECT path, processed FROM library_files ORDER BY path")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_batch_inserts_rows() {
        let (_pool, store) = setup_test_db().await;
        let written = store
            .write_batch("lib-1", &[entry("/m/a.mp3", 10, 1), entry("/m/b.mp3", 20, 2)])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.count_files("lib-1").await.unwrap(), 2);
        assert_eq!(store.count_files("lib-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let (_pool, store) = setup_test_db().await;
        assert_eq!(store.write_batch("lib-1", &[]).await.unwrap(), 0);
        assert_eq!(store.count_files("lib-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rewrite_is_an_upsert() {
        let (_pool, store) = setup_test_db().await;
        let batch = [entry("/m/a.mp3", 10, 1), entry("/m/b.mp3", 20, 2)];
        store.write_batch("lib-1", &batch).await.unwrap();
        store.write_batch("lib-1", &batch).await.unwrap();

        assert_eq!(store.count_files("lib-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_path_in_two_libraries_is_two_rows() {
        let (_pool, store) = setup_test_db().await;
        store.write_batch("lib-1", &[entry("/m/a.mp3", 10, 1)]).await.unwrap();
        store.write_batch("lib-2", &[entry("/m/a.mp3", 10, 1)]).await.unwrap();

        assert_eq!(store.count_files("lib-1").await.unwrap(), 1);
        assert_eq!(store.count_files("lib-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_changed_file_is_marked_unprocessed() {
        let (pool, store) = setup_test_db().await;
        store
            .write_batch("lib-1", &[entry("/m/a.mp3", 10, 1), entry("/m/b.mp3", 20, 2)])
            .await
            .unwrap();
        sqlx::query("UPDATE library_files SET processed = 1")
            .execute(&pool)
            .await
            .unwrap();

        store
            .write_batch("lib-1", &[entry("/m/a.mp3", 10, 1), entry("/m/b.mp3", 25, 3)])
            .await
            .unwrap();

        assert_eq!(
            processed_flags(&pool).await,
            vec![("/m/a.mp3".to_string(), true), ("/m/b.mp3".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_rows() {
        let (pool, store) = setup_test_db().await;
        // Reject one row mid-batch; the rows before it must roll back
        sqlx::query(
            r#"
            CREATE TRIGGER reject_bad BEFORE INSERT ON library_files
            WHEN NEW.path = '/m/bad.mp3'
            BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = store
            .write_batch(
                "lib-1",
                &[entry("/m/a.mp3", 10, 1), entry("/m/bad.mp3", 20, 2), entry("/m/c.mp3", 30, 3)],
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.count_files("lib-1").await.unwrap(), 0);
    }
}
