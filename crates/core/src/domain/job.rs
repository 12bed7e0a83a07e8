// Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Job type used for directory scans
pub const SCAN_DIRECTORY_JOB: &str = "scan.directory";

/// Job State
///
/// `queued -> running -> {succeeded | failed | cancelled}`. A queued job may also be
/// cancelled directly if a cancel request lands before it is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Terminal outcome reported by whoever executed the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Failed => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Job Type (e.g. `scan.directory`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobType(String);

impl JobType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn scan_directory() -> Self {
        Self::new(SCAN_DIRECTORY_JOB)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job Payload (JSON serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub state: JobState,

    /// Opaque progress blob, owned by the executing handler
    pub progress: serde_json::Value,
    /// Advisory flag; the executing handler polls it and stops on its own
    pub cancel_requested: bool,
    /// Terminal detail (error message, cancel reason)
    pub detail: Option<String>,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Job {
    /// Create a new queued Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `job_type` - Job type
    /// * `payload` - Job payload
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        job_type: JobType,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: id.into(),
            job_type,
            payload,
            state: JobState::Queued,
            progress: serde_json::Value::Null,
            cancel_requested: false,
            detail: None,
            created_at,
            updated_at: created_at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Running state with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Queued {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Running.to_string(),
            });
        }
        self.state = JobState::Running;
        self.started_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Replace the progress blob. Only a running job reports progress.
    pub fn set_progress(&mut self, progress: serde_json::Value, now_millis: i64) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "progress".to_string(),
            });
        }
        self.progress = progress;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Raise the cancel flag. Returns false if the job is already terminal.
    pub fn request_cancel(&mut self, now_millis: i64) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.cancel_requested = true;
        self.updated_at = now_millis;
        true
    }

    /// Terminal transition with explicit timestamp
    pub fn finish(
        &mut self,
        outcome: JobOutcome,
        detail: Option<String>,
        now_millis: i64,
    ) -> Result<()> {
        let target = JobState::from(outcome);
        let allowed = match self.state {
            JobState::Running => true,
            // Only a cancel can retire a job that never ran
            JobState::Queued => target == JobState::Cancelled,
            _ => false,
        };
        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        self.state = target;
        self.detail = detail;
        self.finished_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            "job-1",
            1000,
            JobType::scan_directory(),
            JobPayload::new(serde_json::json!({"root": "/music"})),
        )
    }

    #[test]
    fn test_lifecycle_to_succeeded() {
        let mut job = job();
        assert_eq!(job.state, JobState::Queued);

        job.start(2000).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.started_at, Some(2000));

        job.set_progress(serde_json::json!({"files": 3}), 2500).unwrap();
        job.finish(JobOutcome::Succeeded, None, 3000).unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.finished_at, Some(3000));
    }

    #[test]
    fn test_terminal_job_rejects_mutation() {
        let mut job = job();
        job.start(2000).unwrap();
        job.finish(JobOutcome::Failed, Some("boom".into()), 3000).unwrap();

        assert!(job.start(4000).is_err());
        assert!(job.set_progress(serde_json::json!({}), 4000).is_err());
        assert!(job.finish(JobOutcome::Succeeded, None, 4000).is_err());
        assert!(!job.request_cancel(4000));
        assert_eq!(job.detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_queued_job_can_only_be_cancelled() {
        let mut job = job();
        assert!(job.finish(JobOutcome::Succeeded, None, 2000).is_err());
        assert!(job.set_progress(serde_json::json!({}), 2000).is_err());

        assert!(job.request_cancel(2000));
        job.finish(JobOutcome::Cancelled, None, 2100).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            JobState::Queued,
            JobState::Running,
            JobState::Succeeded,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("DONE".parse::<JobState>().is_err());
    }
}
