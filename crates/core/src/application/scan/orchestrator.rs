// Scan Orchestrator
//
// Drives one scan run: path guard, walk, batch writes, ingestion. The ScanRun is
// marked running on entry and reaches exactly one terminal state on exit.

use super::cancel::CancelPoll;
use super::config::ScanConfig;
use crate::application::batch_writer::BatchWriter;
use crate::application::job_queue::JobQueue;
use crate::domain::{
    is_path_inside_allowed_roots, IngestionInput, IngestionStats, JobId, ScanParams,
    ScanProgress, ScanReport, ScanRun, ScanStage, ScanState, ScanStats,
};
use crate::error::{AppError, Result};
use crate::port::{
    FileWalker, LibraryFileStore, LibraryIngestion, ScanRunRepository, TimeProvider, WalkOutcome,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a scan body ended when it did not fail
enum ScanEnd {
    Completed(IngestionStats),
    Cancelled,
}

/// Mutable state of one invocation
struct ScanExecution {
    run: ScanRun,
    writer: BatchWriter,
}

pub struct ScanOrchestrator {
    jobs: Arc<JobQueue>,
    scan_runs: Arc<dyn ScanRunRepository>,
    walker: Arc<dyn FileWalker>,
    store: Arc<dyn LibraryFileStore>,
    ingestion: Arc<dyn LibraryIngestion>,
    time_provider: Arc<dyn TimeProvider>,
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(
        jobs: Arc<JobQueue>,
        scan_runs: Arc<dyn ScanRunRepository>,
        walker: Arc<dyn FileWalker>,
        store: Arc<dyn LibraryFileStore>,
        ingestion: Arc<dyn LibraryIngestion>,
        time_provider: Arc<dyn TimeProvider>,
        config: ScanConfig,
    ) -> Self {
        Self {
            jobs,
            scan_runs,
            walker,
            store,
            ingestion,
            time_provider,
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run one scan to a terminal state.
    ///
    /// Scan failures (path violation, flush, ingestion) do not surface as `Err`:
    /// they end the run as `failed` with `last_error` set and partial counts kept.
    /// `Err` is returned only when the ScanRun itself cannot be loaded, started or
    /// finalised.
    pub async fn run_scan_directory_job(
        &self,
        job_id: &JobId,
        params: &ScanParams,
        cancel_poll: &dyn CancelPoll,
    ) -> Result<ScanReport> {
        let run = self.load_or_create_run(job_id, params).await?;
        let mut exec = ScanExecution {
            writer: BatchWriter::new(
                Arc::clone(&self.store),
                params.library_id.clone(),
                self.config.batch_size,
            ),
            run,
        };

        exec.run.start(self.time_provider.now_millis())?;
        self.scan_runs.update(&exec.run).await?;
        info!(
            scan_id = %params.scan_id,
            job_id = %job_id,
            root = %params.root_path.display(),
            "Scan started"
        );

        let (state, last_error, ingestion) = match self.execute(&mut exec, params, cancel_poll).await {
            Ok(ScanEnd::Completed(stats)) => (ScanState::Succeeded, None, Some(stats)),
            Ok(ScanEnd::Cancelled) => (ScanState::Cancelled, None, None),
            Err(e) => {
                let message = e.to_string();
                exec.run.record_error(message.clone());
                (ScanState::Failed, Some(message), None)
            }
        };

        let stats = ScanStats {
            counts: exec.run.counts,
            ingestion,
        };
        exec.run.finish(
            state,
            last_error.clone(),
            Some(stats),
            self.time_provider.now_millis(),
        )?;
        if !self.scan_runs.update(&exec.run).await? {
            warn!(scan_id = %params.scan_id, "ScanRun was finalised elsewhere, final update skipped");
        }
        self.publish_job_progress(job_id, &exec, ScanStage::Finished).await;

        match &last_error {
            Some(error) => warn!(
                scan_id = %params.scan_id,
                files_persisted = stats.counts.files_persisted,
                error = %error,
                "Scan failed"
            ),
            None => info!(
                scan_id = %params.scan_id,
                state = %state,
                files_discovered = stats.counts.files_discovered,
                files_persisted = stats.counts.files_persisted,
                batches_flushed = stats.counts.batches_flushed,
                errors = stats.counts.errors,
                "Scan finished"
            ),
        }

        Ok(ScanReport {
            scan_id: params.scan_id.clone(),
            state,
            stats,
            last_error,
        })
    }

    async fn load_or_create_run(&self, job_id: &JobId, params: &ScanParams) -> Result<ScanRun> {
        if let Some(run) = self.scan_runs.find_by_id(&params.scan_id).await? {
            if &run.job_id != job_id {
                return Err(AppError::InvalidState(format!(
                    "scan {} belongs to job {}, not {}",
                    run.scan_id, run.job_id, job_id
                )));
            }
            return Ok(run);
        }
        let run = ScanRun::new(
            params.scan_id.clone(),
            job_id.clone(),
            params,
            self.time_provider.now_millis(),
        );
        self.scan_runs.insert(&run).await?;
        Ok(run)
    }

    async fn execute(
        &self,
        exec: &mut ScanExecution,
        params: &ScanParams,
        cancel_poll: &dyn CancelPoll,
    ) -> Result<ScanEnd> {
        if !is_path_inside_allowed_roots(&params.root_path, &params.allowed_roots) {
            return Err(AppError::PathViolation(format!(
                "{} is not inside an allowed library root",
                params.root_path.display()
            )));
        }

        self.publish(exec, ScanStage::Walking).await;

        let options = self.config.walk_options();
        let progress_interval = self.config.progress_interval.max(1);
        for outcome in self.walker.walk(&params.root_path, &options) {
            if cancel_poll.is_cancelled().await {
                return self.stop_cancelled(exec).await;
            }

            match outcome {
                WalkOutcome::Skipped(err) if err.path.as_deref() == Some(params.root_path.as_path()) => {
                    return Err(AppError::Validation(format!("scan root is not readable: {}", err)));
                }
                WalkOutcome::Skipped(err) => {
                    warn!(scan_id = %exec.run.scan_id, error = %err, "Skipping unreadable entry");
                    exec.run.record_error(err.to_string());
                }
                WalkOutcome::File(entry) => {
                    exec.run.record_discovered();
                    exec.writer.add(entry);

                    if exec.writer.is_full() {
                        if cancel_poll.check_now().await {
                            return self.stop_cancelled(exec).await;
                        }
                        self.flush_buffer(exec).await?;
                    } else if exec.run.counts.files_discovered % progress_interval == 0 {
                        self.publish(exec, ScanStage::Walking).await;
                    }
                }
            }
        }

        let cancelled = cancel_poll.check_now().await;
        self.flush_buffer(exec).await?;
        if cancelled {
            info!(scan_id = %exec.run.scan_id, "Scan cancelled after walk");
            return Ok(ScanEnd::Cancelled);
        }

        self.publish(exec, ScanStage::Ingesting).await;
        let input = IngestionInput {
            library_id: params.library_id.clone(),
            library_path: params.root_path.clone(),
            user_id: params.user_id.clone(),
            process_only_unprocessed: params.process_only_unprocessed,
        };
        let stats = self.ingestion.run(&input).await.map_err(|e| match e {
            AppError::Ingestion(_) => e,
            other => AppError::Ingestion(other.to_string()),
        })?;
        debug!(scan_id = %exec.run.scan_id, ?stats, "Ingestion finished");
        Ok(ScanEnd::Completed(stats))
    }

    /// Flush what is buffered and report the scan as cancelled
    async fn stop_cancelled(&self, exec: &mut ScanExecution) -> Result<ScanEnd> {
        info!(
            scan_id = %exec.run.scan_id,
            files_discovered = exec.run.counts.files_discovered,
            "Cancel observed, stopping walk"
        );
        self.flush_buffer(exec).await?;
        Ok(ScanEnd::Cancelled)
    }

    /// Write the buffer, retrying up to `flush_attempts` with the same batch
    async fn flush_buffer(&self, exec: &mut ScanExecution) -> Result<()> {
        if exec.writer.size() == 0 {
            return Ok(());
        }

        let attempts = self.config.flush_attempts.max(1);
        let mut attempt = 1;
        let written = loop {
            match exec.writer.flush().await {
                Ok(written) => break written,
                Err(e) if attempt < attempts => {
                    warn!(
                        scan_id = %exec.run.scan_id,
                        attempt,
                        buffered = exec.writer.size(),
                        error = %e,
                        "Batch write failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        exec.run.record_flush(written);
        self.publish(exec, ScanStage::Walking).await;
        Ok(())
    }

    /// Publish counters to the ScanRun and the job progress blob.
    /// Progress is observability only; a failed publish never fails the scan.
    async fn publish(&self, exec: &mut ScanExecution, stage: ScanStage) {
        exec.run.updated_at = self.time_provider.now_millis();
        if let Err(e) = self.scan_runs.update(&exec.run).await {
            warn!(scan_id = %exec.run.scan_id, error = %e, "ScanRun progress update failed");
        }
        let job_id = exec.run.job_id.clone();
        self.publish_job_progress(&job_id, exec, stage).await;
    }

    async fn publish_job_progress(&self, job_id: &JobId, exec: &ScanExecution, stage: ScanStage) {
        let progress = ScanProgress {
            stage,
            counts: exec.run.counts,
        };
        let value = match serde_json::to_value(progress) {
            Ok(value) => value,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Progress serialization failed");
                return;
            }
        };
        if let Err(e) = self.jobs.mark_progress(job_id, value).await {
            debug!(job_id = %job_id, error = %e, "Job progress not recorded");
        }
    }
}
