//! cratedig daemon - composition root
//!
//! Wires SQLite, the filesystem walker, the scan pipeline, the worker and the
//! JSON-RPC server, then runs until Ctrl+C.

mod config;

use anyhow::{Context, Result};
use config::{DaemonConfig, LogFormat};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cratedig_api_rpc::RpcServer;
use cratedig_core::application::{
    shutdown_channel, InflightLimiter, JobQueue, RecoveryService, ScanJobHandler,
    ScanOrchestrator, ScanService, Worker,
};
use cratedig_core::port::id_provider::UuidProvider;
use cratedig_core::port::time_provider::SystemTimeProvider;
use cratedig_core::VERSION;
use cratedig_infra_fs::WalkdirWalker;
use cratedig_infra_sqlite::{
    create_pool, database_url, run_migrations, SqliteJobRepository, SqliteLayoutIngestion,
    SqliteLibraryFileStore, SqliteScanRunRepository,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("cratedig=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env()?;
    init_logging(config.log_format)?;

    info!(version = VERSION, "cratedig daemon starting");
    info!(
        db_path = %config.db_path.display(),
        allowed_roots = ?config.scan.allowed_roots,
        batch_size = config.scan.batch_size,
        max_concurrent_jobs = config.scheduler.caps.max_concurrent_jobs,
        "Configuration loaded"
    );

    // 2. Database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let pool = create_pool(&database_url(&config.db_path))
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Dependencies
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
    let scan_runs = Arc::new(SqliteScanRunRepository::new(pool.clone()));
    let file_store = Arc::new(SqliteLibraryFileStore::new(pool.clone(), time_provider.clone()));
    let ingestion = Arc::new(SqliteLayoutIngestion::new(pool.clone(), time_provider.clone()));
    let walker = Arc::new(WalkdirWalker::new());

    let jobs = Arc::new(JobQueue::new(
        job_repo.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));

    // 4. Crash recovery, before anything can claim work
    let recovery = RecoveryService::new(job_repo, scan_runs.clone(), time_provider.clone());
    match recovery.recover_interrupted_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    // 5. Scan pipeline and worker
    let orchestrator = Arc::new(ScanOrchestrator::new(
        jobs.clone(),
        scan_runs.clone(),
        walker,
        file_store,
        ingestion,
        time_provider.clone(),
        config.scan.clone(),
    ));
    let scan_handler = Arc::new(ScanJobHandler::new(
        orchestrator,
        jobs.clone(),
        scan_runs.clone(),
        time_provider.clone(),
    ));
    let limiter = Arc::new(InflightLimiter::new());
    let worker = Worker::new(jobs.clone(), limiter.clone(), config.scheduler.clone())
        .register(scan_handler);

    // 6. JSON-RPC server
    let scans = Arc::new(ScanService::new(
        jobs.clone(),
        scan_runs,
        id_provider,
        time_provider,
        &config.scan,
    ));
    let (rpc_handle, rpc_addr) = RpcServer::new(config.rpc.clone(), scans, jobs, limiter)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(shutdown_rx).await {
            error!(error = %e, "Worker failed");
        }
    });

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shut down");

    // 7. Graceful shutdown: stop accepting requests, let running scans finish
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, worker_handle).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Worker did not drain in time; running jobs will be recovered on next start"
        );
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}
