// Job Queue - durable work items and their state machine

pub mod enqueue;

pub use enqueue::EnqueueRequest;

use crate::domain::{Job, JobId, JobOutcome, JobState, JobType};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a cancel request that landed on a live job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequestResult {
    pub job_id: JobId,
    /// State of the job when the flag was raised (queued or running)
    pub state: JobState,
}

/// Job Queue service
///
/// The only writer of Job records. Every mutation is a conditional transition
/// in the repository, so concurrent callers cannot move a job backwards.
pub struct JobQueue {
    job_repo: Arc<dyn JobRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobQueue {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_repo,
            id_provider,
            time_provider,
        }
    }

    /// Insert a QUEUED job
    pub async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> Result<JobId> {
        self.enqueue_request(EnqueueRequest {
            job_id: None,
            job_type: job_type.as_str().to_string(),
            payload,
        })
        .await
    }

    pub async fn enqueue_request(&self, req: EnqueueRequest) -> Result<JobId> {
        enqueue::execute(
            self.job_repo.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
        .await
    }

    /// `queued -> running`
    ///
    /// # Errors
    /// - AppError::NotFound for an unknown job
    /// - AppError::InvalidState when the job is not queued
    pub async fn claim(&self, job_id: &JobId) -> Result<Job> {
        let now = self.time_provider.now_millis();
        match self.job_repo.claim(job_id, now).await? {
            Some(job) => {
                debug!(job_id = %job_id, "Job claimed");
                Ok(job)
            }
            None => Err(self.rejection(job_id, "claim").await),
        }
    }

    /// Replace the progress blob of a running job
    pub async fn mark_progress(&self, job_id: &JobId, progress: serde_json::Value) -> Result<()> {
        let now = self.time_provider.now_millis();
        if self.job_repo.update_progress(job_id, &progress, now).await? {
            Ok(())
        } else {
            Err(self.rejection(job_id, "progress").await)
        }
    }

    /// Raise the cancel flag on a queued or running job.
    ///
    /// `None` means nothing is cancellable: the job is unknown or already terminal.
    pub async fn request_cancel(&self, job_id: &JobId) -> Result<Option<CancelRequestResult>> {
        let now = self.time_provider.now_millis();
        let result = self
            .job_repo
            .request_cancel(job_id, now)
            .await?
            .map(|job| CancelRequestResult {
                job_id: job.id,
                state: job.state,
            });

        match &result {
            Some(r) => info!(job_id = %job_id, state = %r.state, "Cancel requested"),
            None => debug!(job_id = %job_id, "Cancel request on non-cancellable job"),
        }
        Ok(result)
    }

    /// Terminal transition
    ///
    /// # Errors
    /// - AppError::NotFound for an unknown job
    /// - AppError::InvalidState when the job is already terminal (or queued and
    ///   the outcome is not `cancelled`)
    pub async fn complete(
        &self,
        job_id: &JobId,
        outcome: JobOutcome,
        detail: Option<&str>,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();
        let state = JobState::from(outcome);
        if self.job_repo.finish(job_id, state, detail, now).await? {
            info!(job_id = %job_id, state = %state, detail = ?detail, "Job completed");
            Ok(())
        } else {
            Err(self.rejection(job_id, state.as_str()).await)
        }
    }

    pub async fn get(&self, job_id: &JobId) -> Result<Option<Job>> {
        self.job_repo.find_by_id(job_id).await
    }

    pub async fn is_cancel_requested(&self, job_id: &JobId) -> Result<bool> {
        self.job_repo
            .is_cancel_requested(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }

    /// Oldest queued jobs first
    pub async fn next_queued(&self, limit: usize, skip_types: &[String]) -> Result<Vec<Job>> {
        self.job_repo.next_queued(limit, skip_types).await
    }

    pub async fn count_by_state(&self, state: JobState) -> Result<i64> {
        self.job_repo.count_by_state(state).await
    }

    /// Error explaining why a conditional transition did not apply
    async fn rejection(&self, job_id: &JobId, attempted: &str) -> AppError {
        match self.job_repo.find_by_id(job_id).await {
            Ok(Some(job)) => AppError::InvalidState(format!(
                "job {} is {}, cannot {}",
                job_id, job.state, attempted
            )),
            Ok(None) => AppError::NotFound(format!("job {}", job_id)),
            Err(e) => e,
        }
    }
}
