// Job Repository Port (Interface)

use crate::domain::{Job, JobId, JobState};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// State-changing methods are conditional: they only apply when the stored job is
/// in a state that allows the change, and report whether they did.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Atomically move a QUEUED job to RUNNING. `None` if the job is not queued.
    async fn claim(&self, id: &JobId, now_millis: i64) -> Result<Option<Job>>;

    /// Replace the progress blob of a RUNNING job. `false` if not running.
    async fn update_progress(
        &self,
        id: &JobId,
        progress: &serde_json::Value,
        now_millis: i64,
    ) -> Result<bool>;

    /// Raise the cancel flag on a QUEUED or RUNNING job. `None` if the job is
    /// missing or terminal.
    async fn request_cancel(&self, id: &JobId, now_millis: i64) -> Result<Option<Job>>;

    /// Terminal transition. `false` if the stored state forbids it.
    async fn finish(
        &self,
        id: &JobId,
        state: JobState,
        detail: Option<&str>,
        now_millis: i64,
    ) -> Result<bool>;

    /// Cancel flag of a job, `None` if the job does not exist
    async fn is_cancel_requested(&self, id: &JobId) -> Result<Option<bool>>;

    /// Oldest QUEUED jobs first, leaving out `skip_types` before `limit` applies
    async fn next_queued(&self, limit: usize, skip_types: &[String]) -> Result<Vec<Job>>;

    /// Count jobs by state
    async fn count_by_state(&self, state: JobState) -> Result<i64>;

    /// Find all jobs by state (used by crash recovery)
    async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::JobOutcome;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory JobRepository applying the same transition rules as the SQL adapter
    #[derive(Default)]
    pub struct InMemoryJobRepository {
        jobs: Mutex<HashMap<JobId, Job>>,
        fail_writes: AtomicBool,
    }

    impl InMemoryJobRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent insert fail like an unavailable store
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn check_writable(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Database("store unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<()> {
            self.check_writable()?;
            self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn claim(&self, id: &JobId, now_millis: i64) -> Result<Option<Job>> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(id) {
                if job.start(now_millis).is_ok() {
                    return Ok(Some(job.clone()));
                }
            }
            Ok(None)
        }

        async fn update_progress(
            &self,
            id: &JobId,
            progress: &serde_json::Value,
            now_millis: i64,
        ) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(jobs
                .get_mut(id)
                .map(|job| job.set_progress(progress.clone(), now_millis).is_ok())
                .unwrap_or(false))
        }

        async fn request_cancel(&self, id: &JobId, now_millis: i64) -> Result<Option<Job>> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(id) {
                if job.request_cancel(now_millis) {
                    return Ok(Some(job.clone()));
                }
            }
            Ok(None)
        }

        async fn finish(
            &self,
            id: &JobId,
            state: JobState,
            detail: Option<&str>,
            now_millis: i64,
        ) -> Result<bool> {
            let outcome = match state {
                JobState::Succeeded => JobOutcome::Succeeded,
                JobState::Failed => JobOutcome::Failed,
                JobState::Cancelled => JobOutcome::Cancelled,
                _ => return Ok(false),
            };
            let mut jobs = self.jobs.lock().unwrap();
            Ok(jobs
                .get_mut(id)
                .map(|job| {
                    job.finish(outcome, detail.map(str::to_string), now_millis)
                        .is_ok()
                })
                .unwrap_or(false))
        }

        async fn is_cancel_requested(&self, id: &JobId) -> Result<Option<bool>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .get(id)
                .map(|job| job.cancel_requested))
        }

        async fn next_queued(&self, limit: usize, skip_types: &[String]) -> Result<Vec<Job>> {
            let jobs = self.jobs.lock().unwrap();
            let mut queued: Vec<Job> = jobs
                .values()
                .filter(|job| job.state == JobState::Queued)
                .filter(|job| !skip_types.iter().any(|t| t == job.job_type.as_str()))
                .cloned()
                .collect();
            queued.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            queued.truncate(limit);
            Ok(queued)
        }

        async fn count_by_state(&self, state: JobState) -> Result<i64> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.values().filter(|job| job.state == state).count() as i64)
        }

        async fn find_by_state(&self, state: JobState) -> Result<Vec<Job>> {
            let jobs = self.jobs.lock().unwrap();
            let mut found: Vec<Job> = jobs
                .values()
                .filter(|job| job.state == state)
                .cloned()
                .collect();
            found.sort_by_key(|job| job.created_at);
            Ok(found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::InMemoryJobRepository;
    use super::*;
    use crate::domain::{JobPayload, JobType};
    use serde_json::json;

    fn job(id: &str, created_at: i64, job_type: JobType) -> Job {
        Job::new(id, created_at, job_type, JobPayload::new(json!({})))
    }

    #[tokio::test]
    async fn test_in_memory_claim_applies_once() {
        let repo = InMemoryJobRepository::new();
        repo.insert(&job("job-1", 1_000, JobType::scan_directory()))
            .await
            .unwrap();
        let id = "job-1".to_string();

        let claimed = repo.claim(&id, 2_000).await.unwrap().unwrap();
        assert_eq!(claimed.state, JobState::Running);
        assert_eq!(claimed.started_at, Some(2_000));
        assert!(repo.claim(&id, 3_000).await.unwrap().is_none());
        assert!(repo.claim(&"missing".to_string(), 3_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_cancel_skips_terminal_jobs() {
        let repo = InMemoryJobRepository::new();
        repo.insert(&job("job-1", 1_000, JobType::scan_directory()))
            .await
            .unwrap();
        let id = "job-1".to_string();

        let flagged = repo.request_cancel(&id, 2_000).await.unwrap().unwrap();
        assert!(flagged.cancel_requested);
        assert_eq!(repo.is_cancel_requested(&id).await.unwrap(), Some(true));

        assert!(repo.finish(&id, JobState::Cancelled, None, 3_000).await.unwrap());
        assert!(repo.request_cancel(&id, 4_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_next_queued_skips_types_before_limit() {
        let repo = InMemoryJobRepository::new();
        repo.insert(&job("scan-1", 1_000, JobType::scan_directory()))
            .await
            .unwrap();
        repo.insert(&job("scan-2", 2_000, JobType::scan_directory()))
            .await
            .unwrap();
        repo.insert(&job("art-1", 3_000, JobType::new("artwork.fetch")))
            .await
            .unwrap();

        let skip = vec![JobType::scan_directory().as_str().to_string()];
        let next = repo.next_queued(1, &skip).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, "art-1");
    }
}
