// Job Handler Port (executes one job type)

use crate::domain::{Job, JobOutcome};
use crate::error::Result;
use async_trait::async_trait;

/// Terminal result a handler reports for the job it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub outcome: JobOutcome,
    pub detail: Option<String>,
}

impl JobCompletion {
    pub fn succeeded() -> Self {
        Self {
            outcome: JobOutcome::Succeeded,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            outcome: JobOutcome::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            outcome: JobOutcome::Cancelled,
            detail: None,
        }
    }
}

/// Executes claimed jobs of one type
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Job type this handler is registered for
    fn job_type(&self) -> &str;

    /// Run a claimed (RUNNING) job to completion. The worker records the
    /// returned outcome on the job.
    async fn execute(&self, job: &Job) -> Result<JobCompletion>;

    /// Called when the worker retires a job without a handler-reported outcome:
    /// cancelled before start, or `execute` panicked. Handlers with side records
    /// finalise them here.
    async fn finalize_abandoned(&self, _job: &Job, _completion: &JobCompletion) -> Result<()> {
        Ok(())
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Handler returning a fixed completion after an optional delay
    pub struct MockJobHandler {
        job_type: String,
        completion: JobCompletion,
        delay: Duration,
        panics: bool,
        executed: Mutex<Vec<String>>,
        finalized: AtomicUsize,
    }

    impl MockJobHandler {
        pub fn new(job_type: impl Into<String>, completion: JobCompletion) -> Self {
            Self {
                job_type: job_type.into(),
                completion,
                delay: Duration::ZERO,
                panics: false,
                executed: Mutex::new(Vec::new()),
                finalized: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Panic inside `execute` (worker must still complete the job)
        pub fn panicking(mut self) -> Self {
            self.panics = true;
            self
        }

        pub fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }

        pub fn finalized_count(&self) -> usize {
            self.finalized.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for MockJobHandler {
        fn job_type(&self) -> &str {
            &self.job_type
        }

        async fn execute(&self, job: &Job) -> Result<JobCompletion> {
            self.executed.lock().unwrap().push(job.id.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.panics {
                panic!("handler panic for job {}", job.id);
            }
            Ok(self.completion.clone())
        }

        async fn finalize_abandoned(&self, _job: &Job, _completion: &JobCompletion) -> Result<()> {
            self.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
