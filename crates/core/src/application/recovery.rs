// Crash recovery: retire work interrupted by a previous process
use crate::application::worker::constants::INTERRUPTED_BY_RESTART;
use crate::domain::{JobState, ScanState, ScanStats};
use crate::error::Result;
use crate::port::{JobRepository, ScanRunRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// On daemon startup, jobs still RUNNING belong to a process that no longer
/// exists. Scans are not resumable mid-walk, so each such job is completed as
/// FAILED and its ScanRun is finalised with the same error. Batches flushed
/// before the crash stay persisted.
pub struct RecoveryService {
    job_repo: Arc<dyn JobRepository>,
    scan_runs: Arc<dyn ScanRunRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        scan_runs: Arc<dyn ScanRunRepository>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_repo,
            scan_runs,
            time_provider,
        }
    }

    /// Returns the number of jobs recovered
    pub async fn recover_interrupted_jobs(&self) -> Result<usize> {
        let running_jobs = self.job_repo.find_by_state(JobState::Running).await?;
        info!(count = running_jobs.len(), "Starting interrupted job recovery");

        let mut recovered_count = 0;
        for job in running_jobs {
            let now = self.time_provider.now_millis();
            let finished = self
                .job_repo
                .finish(&job.id, JobState::Failed, Some(INTERRUPTED_BY_RESTART), now)
                .await?;
            if !finished {
                warn!(job_id = %job.id, "Job changed state during recovery, skipping");
                continue;
            }
            recovered_count += 1;

            if let Some(mut run) = self.scan_runs.find_by_job_id(&job.id).await? {
                if !run.state.is_terminal() {
                    run.record_error(INTERRUPTED_BY_RESTART);
                    let stats = ScanStats {
                        counts: run.counts,
                        ingestion: None,
                    };
                    run.finish(
                        ScanState::Failed,
                        Some(INTERRUPTED_BY_RESTART.to_string()),
                        Some(stats),
                        now,
                    )?;
                    self.scan_runs.update(&run).await?;
                    info!(
                        job_id = %job.id,
                        scan_id = %run.scan_id,
                        files_persisted = run.counts.files_persisted,
                        "Interrupted scan marked failed"
                    );
                }
            }
        }

        info!(recovered_count, "Interrupted job recovery complete");
        Ok(recovered_count)
    }
}
