// SQLite ScanRunRepository Implementation

use crate::error::{from_db_count, map_sqlx_error, to_db_count};
use async_trait::async_trait;
use cratedig_core::domain::{JobId, ScanCounts, ScanId, ScanRun};
use cratedig_core::error::Result;
use cratedig_core::port::ScanRunRepository;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct SqliteScanRunRepository {
    pool: SqlitePool,
}

impl SqliteScanRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanRunRepository for SqliteScanRunRepository {
    async fn insert(&self, run: &ScanRun) -> Result<()> {
        let stats = run.stats.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO scan_runs (
                scan_id, job_id, user_id, library_id, root_path, state,
                files_discovered, files_persisted, batches_flushed, errors,
                error_messages, last_error, stats, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.scan_id)
        .bind(&run.job_id)
        .bind(&run.user_id)
        .bind(&run.library_id)
        .bind(&run.root_path)
        .bind(run.state.as_str())
        .bind(to_db_count(run.counts.files_discovered))
        .bind(to_db_count(run.counts.files_persisted))
        .bind(to_db_count(run.counts.batches_flushed))
        .bind(to_db_count(run.counts.errors))
        .bind(serde_json::to_string(&run.error_messages)?)
        .bind(&run.last_error)
        .bind(stats)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, scan_id: &ScanId) -> Result<Option<ScanRun>> {
        let row = sqlx::query_as::<_, ScanRunRow>("SELECT * FROM scan_runs WHERE scan_id = ?")
            .bind(scan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ScanRunRow::into_scan_run).transpose()
    }

    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<ScanRun>> {
        let row = sqlx::query_as::<_, ScanRunRow>("SELECT * FROM scan_runs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ScanRunRow::into_scan_run).transpose()
    }

    async fn update(&self, run: &ScanRun) -> Result<bool> {
        let stats = run.stats.as_ref().map(serde_json::to_string).transpose()?;

        // A terminal row is frozen
        let result = sqlx::query(
            r#"
            UPDATE scan_runs
            SET state = ?,
                files_discovered = ?,
                files_persisted = ?,
                batches_flushed = ?,
                errors = ?,
                error_messages = ?,
                last_error = ?,
                stats = ?,
                updated_at = ?
            WHERE scan_id = ? AND state IN ('queued', 'running')
            "#,
        )
        .bind(run.state.as_str())
        .bind(to_db_count(run.counts.files_discovered))
        .bind(to_db_count(run.counts.files_persisted))
        .bind(to_db_count(run.counts.batches_flushed))
        .bind(to_db_count(run.counts.errors))
        .bind(serde_json::to_string(&run.error_messages)?)
        .bind(&run.last_error)
        .bind(stats)
        .bind(run.updated_at)
        .bind(&run.scan_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanRunRow {
    scan_id: String,
    job_id: String,
    user_id: String,
    library_id: String,
    root_path: String,
    state: String,
    files_discovered: i64,
    files_persisted: i64,
    batches_flushed: i64,
    errors: i64,
    error_messages: String,
    last_error: Option<String>,
    stats: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl ScanRunRow {
    fn into_scan_run(self) -> Result<ScanRun> {
        let stats = self
            .stats
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(ScanRun {
            state: self.state.parse()?,
            counts: ScanCounts {
                files_discovered: from_db_count(self.files_discovered),
                files_persisted: from_db_count(self.files_persisted),
                batches_flushed: from_db_count(self.batches_flushed),
                errors: from_db_count(self.errors),
            },
            error_messages: serde_json::from_str(&self.error_messages)?,
            stats,
            scan_id: self.scan_id,
            job_id: self.job_id,
            user_id: self.user_id,
            library_id: self.library_id,
            root_path: self.root_path,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use cratedig_core::domain::{IngestionStats, ScanParams, ScanState, ScanStats};
    use std::path::PathBuf;

    async fn setup_test_db() -> SqliteScanRunRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteScanRunRepository::new(pool)
    }

    fn run(scan_id: &str, job_id: &str) -> ScanRun {
        let params = ScanParams {
            scan_id: scan_id.into(),
            user_id: "user-1".into(),
            library_id: "lib-1".into(),
            root_path: PathBuf::from("/music/lib"),
            allowed_roots: vec![PathBuf::from("/music")],
            process_only_unprocessed: true,
        };
        ScanRun::new(scan_id, job_id, &params, 1_000)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        repo.insert(&run("scan-1", "job-1")).await.unwrap();

        let by_id = repo.find_by_id(&"scan-1".to_string()).await.unwrap().unwrap();
        assert_eq!(by_id.state, ScanState::Queued);
        assert_eq!(by_id.root_path, "/music/lib");
        assert_eq!(by_id.counts, ScanCounts::default());
        assert!(by_id.error_messages.is_empty());
        assert!(by_id.stats.is_none());

        let by_job = repo.find_by_job_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(by_job.scan_id, "scan-1");

        assert!(repo.find_by_id(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_round_trips_counters_and_stats() {
        let repo = setup_test_db().await;
        let mut scan = run("scan-1", "job-1");
        repo.insert(&scan).await.unwrap();

        scan.start(2_000).unwrap();
        for _ in 0..3 {
            scan.record_discovered();
        }
        scan.record_flush(2);
        scan.record_error("PermissionDenied: /music/lib/locked");
        assert!(repo.update(&scan).await.unwrap());

        let stats = ScanStats {
            counts: scan.counts,
            ingestion: Some(IngestionStats {
                scanned_files: 2,
                added_tracks: 2,
                ..Default::default()
            }),
        };
        scan.finish(ScanState::Succeeded, None, Some(stats), 3_000).unwrap();
        assert!(repo.update(&scan).await.unwrap());

        let stored = repo.find_by_id(&"scan-1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.state, ScanState::Succeeded);
        assert_eq!(stored.counts.files_discovered, 3);
        assert_eq!(stored.counts.files_persisted, 2);
        assert_eq!(stored.counts.batches_flushed, 1);
        assert_eq!(stored.counts.errors, 1);
        assert_eq!(stored.error_messages, vec!["PermissionDenied: /music/lib/locked"]);
        assert_eq!(stored.stats, Some(stats));
        assert_eq!(stored.updated_at, 3_000);
    }

    #[tokio::test]
    async fn test_terminal_run_is_frozen() {
        let repo = setup_test_db().await;
        let mut scan = run("scan-1", "job-1");
        repo.insert(&scan).await.unwrap();
        scan.start(2_000).unwrap();
        scan.finish(ScanState::Cancelled, None, None, 2_500).unwrap();
        assert!(repo.update(&scan).await.unwrap());

        let mut stale = run("scan-1", "job-1");
        stale.start(3_000).unwrap();
        assert!(!repo.update(&stale).await.unwrap());

        let stored = repo.find_by_id(&"scan-1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.state, ScanState::Cancelled);
    }

    #[tokio::test]
    async fn test_job_id_is_unique() {
        let repo = setup_test_db().await;
        repo.insert(&run("scan-1", "job-1")).await.unwrap();
        assert!(repo.insert(&run("scan-2", "job-1")).await.is_err());
    }
}
