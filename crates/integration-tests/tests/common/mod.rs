//! Shared wiring for the end-to-end tests: real SQLite, real filesystem walker.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cratedig_core::application::{
    InflightLimiter, JobQueue, ScanConfig, ScanJobHandler, ScanOrchestrator, ScanService,
    SchedulerConfig, Worker,
};
use cratedig_core::application::scan::StartScanRequest;
use cratedig_core::port::id_provider::UuidProvider;
use cratedig_core::port::time_provider::SystemTimeProvider;
use cratedig_infra_fs::WalkdirWalker;
use cratedig_infra_sqlite::{
    create_pool, run_migrations, SqliteJobRepository, SqliteLayoutIngestion,
    SqliteLibraryFileStore, SqliteScanRunRepository,
};
use sqlx::SqlitePool;

pub const USER: &str = "user-1";
pub const LIBRARY: &str = "main";

pub struct Pipeline {
    pub pool: SqlitePool,
    pub job_repo: Arc<SqliteJobRepository>,
    pub scan_runs: Arc<SqliteScanRunRepository>,
    pub files: Arc<SqliteLibraryFileStore>,
    pub jobs: Arc<JobQueue>,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub scans: Arc<ScanService>,
    pub limiter: Arc<InflightLimiter>,
    pub worker: Worker,
}

impl Pipeline {
    /// Wire every adapter against `database_url`, allowing scans under `library_root`
    pub async fn open(database_url: &str, library_root: &Path, batch_size: usize) -> Self {
        let pool = create_pool(database_url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let time_provider = Arc::new(SystemTimeProvider);
        let id_provider = Arc::new(UuidProvider);
        let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
        let scan_runs = Arc::new(SqliteScanRunRepository::new(pool.clone()));
        let files = Arc::new(SqliteLibraryFileStore::new(pool.clone(), time_provider.clone()));
        let ingestion = Arc::new(SqliteLayoutIngestion::new(pool.clone(), time_provider.clone()));

        let config = ScanConfig {
            batch_size,
            allowed_roots: vec![library_root.to_path_buf()],
            ..Default::default()
        };

        let jobs = Arc::new(JobQueue::new(
            job_repo.clone(),
            id_provider.clone(),
            time_provider.clone(),
        ));
        let orchestrator = Arc::new(ScanOrchestrator::new(
            jobs.clone(),
            scan_runs.clone(),
            Arc::new(WalkdirWalker::new()),
            files.clone(),
            ingestion,
            time_provider.clone(),
            config.clone(),
        ));
        let handler = Arc::new(ScanJobHandler::new(
            orchestrator.clone(),
            jobs.clone(),
            scan_runs.clone(),
            time_provider.clone(),
        ));
        let limiter = Arc::new(InflightLimiter::new());
        let worker = Worker::new(jobs.clone(), limiter.clone(), SchedulerConfig::default())
            .register(handler);
        let scans = Arc::new(ScanService::new(
            jobs.clone(),
            scan_runs.clone(),
            id_provider,
            time_provider,
            &config,
        ));

        Self {
            pool,
            job_repo,
            scan_runs,
            files,
            jobs,
            orchestrator,
            scans,
            limiter,
            worker,
        }
    }

    pub async fn in_memory(library_root: &Path, batch_size: usize) -> Self {
        Self::open("sqlite::memory:", library_root, batch_size).await
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub fn scan_request(root: &Path) -> StartScanRequest {
    StartScanRequest {
        user_id: USER.to_string(),
        library_id: LIBRARY.to_string(),
        paths: vec![root.to_path_buf()],
        process_only_unprocessed: false,
    }
}

/// Write an empty file, creating parent folders
pub fn touch(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, b"").unwrap();
    path
}

/// Three media files at different depths plus one non-media file
pub fn seed_library(root: &Path) {
    touch(root, "a.mp3");
    touch(root, "ignore.txt");
    touch(root, "sub/b.flac");
    touch(root, "sub/deep/c.ogg");
}
