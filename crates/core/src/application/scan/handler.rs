// Worker handler for `scan.directory` jobs

use super::cancel::JobCancelPoll;
use super::orchestrator::ScanOrchestrator;
use crate::application::job_queue::JobQueue;
use crate::domain::{Job, JobOutcome, ScanParams, ScanState, ScanStats, SCAN_DIRECTORY_JOB};
use crate::error::Result;
use crate::port::{JobCompletion, JobHandler, ScanRunRepository, TimeProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

pub struct ScanJobHandler {
    orchestrator: Arc<ScanOrchestrator>,
    jobs: Arc<JobQueue>,
    scan_runs: Arc<dyn ScanRunRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ScanJobHandler {
    pub fn new(
        orchestrator: Arc<ScanOrchestrator>,
        jobs: Arc<JobQueue>,
        scan_runs: Arc<dyn ScanRunRepository>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            orchestrator,
            jobs,
            scan_runs,
            time_provider,
        }
    }

    /// Move the job's ScanRun (if any, and not yet terminal) to `state`
    async fn finalize_run(&self, job: &Job, state: ScanState, last_error: Option<&str>) -> Result<()> {
        let Some(mut run) = self.scan_runs.find_by_job_id(&job.id).await? else {
            return Ok(());
        };
        if run.state.is_terminal() {
            return Ok(());
        }
        if let Some(message) = last_error {
            run.record_error(message);
        }
        let stats = ScanStats {
            counts: run.counts,
            ingestion: None,
        };
        run.finish(
            state,
            last_error.map(str::to_string),
            Some(stats),
            self.time_provider.now_millis(),
        )?;
        self.scan_runs.update(&run).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ScanJobHandler {
    fn job_type(&self) -> &str {
        SCAN_DIRECTORY_JOB
    }

    async fn execute(&self, job: &Job) -> Result<JobCompletion> {
        let params: ScanParams = match serde_json::from_value(job.payload.as_value().clone()) {
            Ok(params) => params,
            Err(e) => {
                let detail = format!("invalid scan payload: {}", e);
                warn!(job_id = %job.id, error = %e, "Rejecting scan job");
                self.finalize_run(job, ScanState::Failed, Some(&detail)).await?;
                return Ok(JobCompletion::failed(detail));
            }
        };

        let cancel_poll = JobCancelPoll::new(
            Arc::clone(&self.jobs),
            job.id.clone(),
            Arc::clone(&self.time_provider),
            self.orchestrator.config().cancel_poll_interval,
        );

        match self
            .orchestrator
            .run_scan_directory_job(&job.id, &params, &cancel_poll)
            .await
        {
            Ok(report) => Ok(JobCompletion {
                outcome: report.job_outcome(),
                detail: report.last_error,
            }),
            Err(e) => {
                let detail = e.to_string();
                if let Err(finalize_err) =
                    self.finalize_run(job, ScanState::Failed, Some(&detail)).await
                {
                    error!(job_id = %job.id, error = %finalize_err, "Could not finalise ScanRun");
                }
                Ok(JobCompletion::failed(detail))
            }
        }
    }

    async fn finalize_abandoned(&self, job: &Job, completion: &JobCompletion) -> Result<()> {
        // Only a failed run carries last_error
        let (state, last_error) = match completion.outcome {
            JobOutcome::Succeeded => (ScanState::Succeeded, None),
            JobOutcome::Failed => (ScanState::Failed, completion.detail.as_deref()),
            JobOutcome::Cancelled => (ScanState::Cancelled, None),
        };
        self.finalize_run(job, state, last_error).await
    }
}
