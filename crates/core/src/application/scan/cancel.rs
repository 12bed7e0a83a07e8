// Cooperative cancellation

use crate::application::job_queue::{CancelRequestResult, JobQueue};
use crate::domain::{JobId, ScanId};
use crate::port::TimeProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Reason reported when a cancel request has nothing to cancel
pub const NOT_CANCELLABLE: &str = "not_cancellable";

/// Capability the orchestrator consults between units of work
#[async_trait]
pub trait CancelPoll: Send + Sync {
    /// Checked between entries; may answer from a recent read
    async fn is_cancelled(&self) -> bool;

    /// Checked before each batch write and after the walk; never cached
    async fn check_now(&self) -> bool {
        self.is_cancelled().await
    }
}

#[async_trait]
impl<F> CancelPoll for F
where
    F: Fn() -> bool + Send + Sync,
{
    async fn is_cancelled(&self) -> bool {
        self()
    }
}

#[derive(Debug, Default)]
struct PollCache {
    last_checked_at: Option<i64>,
    cancelled: bool,
}

/// Reads the job's cancel flag through the Job Queue
///
/// `is_cancelled` spaces store reads by `min_interval` and reuses the last
/// answer in between. `check_now` always reads. Once a cancel is seen it
/// stays seen.
pub struct JobCancelPoll {
    queue: Arc<JobQueue>,
    job_id: JobId,
    time_provider: Arc<dyn TimeProvider>,
    min_interval_ms: i64,
    cache: Mutex<PollCache>,
}

impl JobCancelPoll {
    pub fn new(
        queue: Arc<JobQueue>,
        job_id: JobId,
        time_provider: Arc<dyn TimeProvider>,
        min_interval: Duration,
    ) -> Self {
        Self {
            queue,
            job_id,
            time_provider,
            min_interval_ms: i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX),
            cache: Mutex::new(PollCache::default()),
        }
    }
}

impl JobCancelPoll {
    async fn read_flag(&self, now: i64) -> bool {
        let cancelled = match self.queue.is_cancel_requested(&self.job_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Cancel flag read failed, continuing");
                false
            }
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.last_checked_at = Some(now);
        cache.cancelled |= cancelled;
        cache.cancelled
    }
}

#[async_trait]
impl CancelPoll for JobCancelPoll {
    async fn is_cancelled(&self) -> bool {
        let now = self.time_provider.now_millis();
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if cache.cancelled {
                return true;
            }
            if let Some(last) = cache.last_checked_at {
                if now - last < self.min_interval_ms {
                    return false;
                }
            }
        }
        self.read_flag(now).await
    }

    async fn check_now(&self) -> bool {
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if cache.cancelled {
                return true;
            }
        }
        self.read_flag(self.time_provider.now_millis()).await
    }
}

/// Response of a cancel-scan request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelScanResponse {
    pub scan_id: ScanId,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Derive the cancel response from the queue's cancel result
pub fn build_cancel_response(
    scan_id: impl Into<ScanId>,
    result: Option<&CancelRequestResult>,
) -> CancelScanResponse {
    CancelScanResponse {
        scan_id: scan_id.into(),
        cancelled: result.is_some(),
        reason: match result {
            Some(_) => None,
            None => Some(NOT_CANCELLABLE.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobOutcome, JobState, JobType};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use serde_json::json;

    #[test]
    fn test_cancel_response_for_live_job() {
        let result = CancelRequestResult {
            job_id: "job-1".into(),
            state: JobState::Running,
        };
        let response = build_cancel_response("scan-1", Some(&result));
        assert!(response.cancelled);
        assert_eq!(response.reason, None);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"scan_id": "scan-1", "cancelled": true})
        );
    }

    #[test]
    fn test_cancel_response_for_unknown_or_terminal_job() {
        let response = build_cancel_response("scan-1", None);
        assert!(!response.cancelled);
        assert_eq!(response.reason.as_deref(), Some(NOT_CANCELLABLE));
    }

    #[tokio::test]
    async fn test_closure_is_a_cancel_poll() {
        let poll = || true;
        assert!(poll.is_cancelled().await);
    }

    #[tokio::test]
    async fn test_job_cancel_poll_throttles_store_reads() {
        let clock = Arc::new(ManualTimeProvider::new(10_000));
        let queue = Arc::new(JobQueue::new(
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(SequentialIdProvider::new("job")),
            clock.clone(),
        ));
        let job_id = queue.enqueue(JobType::scan_directory(), json!({})).await.unwrap();
        queue.claim(&job_id).await.unwrap();

        let poll = JobCancelPoll::new(
            queue.clone(),
            job_id.clone(),
            clock.clone(),
            Duration::from_millis(100),
        );
        assert!(!poll.is_cancelled().await);

        queue.request_cancel(&job_id).await.unwrap();
        // Within the interval the cached answer is reused
        assert!(!poll.is_cancelled().await);

        clock.advance(100);
        assert!(poll.is_cancelled().await);

        // Sticky even after the job reaches a terminal state
        queue
            .complete(&job_id, JobOutcome::Cancelled, None)
            .await
            .unwrap();
        assert!(poll.is_cancelled().await);
    }

    #[tokio::test]
    async fn test_check_now_ignores_throttle() {
        let clock = Arc::new(ManualTimeProvider::new(10_000));
        let queue = Arc::new(JobQueue::new(
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(SequentialIdProvider::new("job")),
            clock.clone(),
        ));
        let job_id = queue.enqueue(JobType::scan_directory(), json!({})).await.unwrap();
        queue.claim(&job_id).await.unwrap();

        let poll = JobCancelPoll::new(
            queue.clone(),
            job_id.clone(),
            clock.clone(),
            Duration::from_secs(60),
        );
        assert!(!poll.is_cancelled().await);
        queue.request_cancel(&job_id).await.unwrap();

        // Clock has not moved: the throttled check still answers from cache
        assert!(!poll.is_cancelled().await);
        assert!(poll.check_now().await);
        // ...and the forced read feeds the cache
        assert!(poll.is_cancelled().await);
    }
}
