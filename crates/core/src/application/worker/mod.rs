// Worker - scheduler loop dispatching claimed jobs to handlers

mod config;
pub mod constants;
mod shutdown;

pub use config::SchedulerConfig;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use constants::*;

use crate::application::job_queue::JobQueue;
use crate::application::limiter::{InflightLimiter, InflightPermit};
use crate::domain::{Job, JobOutcome};
use crate::error::{AppError, Result};
use crate::port::{JobCompletion, JobHandler};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Single scheduler per process
///
/// Each tick looks at the oldest queued jobs, checks the limiter against the
/// admission caps, claims what fits and runs each claimed job on its own task.
pub struct Worker {
    jobs: Arc<JobQueue>,
    limiter: Arc<InflightLimiter>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    config: SchedulerConfig,
}

impl Worker {
    pub fn new(jobs: Arc<JobQueue>, limiter: Arc<InflightLimiter>, config: SchedulerConfig) -> Self {
        Self {
            jobs,
            limiter,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register the handler for its job type (replaces any previous one)
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.job_type().to_string(), handler);
        self
    }

    pub fn limiter(&self) -> &Arc<InflightLimiter> {
        &self.limiter
    }

    /// Run the scheduler loop until shutdown, then wait for in-flight jobs
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            job_types = ?self.handlers.keys().collect::<Vec<_>>(),
            max_concurrent_jobs = self.config.caps.max_concurrent_jobs,
            "Worker started"
        );
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            while let Some(result) = tasks.try_join_next() {
                log_task_exit(result);
            }

            match self.dispatch_ready(&mut tasks).await {
                Ok(dispatched) if dispatched > 0 => continue,
                Ok(_) => {
                    // Idle or at capacity: wake on timeout, shutdown or a finished job
                    tokio::select! {
                        _ = sleep(self.config.idle_sleep) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during idle");
                            break;
                        }
                        Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                            log_task_exit(result);
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Scheduler tick failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }

        info!(inflight = tasks.len(), "Worker shutting down, waiting for in-flight jobs");
        while let Some(result) = tasks.join_next().await {
            log_task_exit(result);
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Dispatch queued jobs until the queue or the caps are exhausted, then
    /// wait for every dispatched job. Returns the number of jobs executed.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut total = 0;
        loop {
            let dispatched = self.dispatch_ready(&mut tasks).await?;
            total += dispatched;
            if dispatched == 0 {
                match tasks.join_next().await {
                    Some(result) => log_task_exit(result),
                    None => break,
                }
            }
        }
        Ok(total)
    }

    /// One scheduler tick. Returns how many jobs were spawned.
    pub async fn dispatch_ready(&self, tasks: &mut JoinSet<()>) -> Result<usize> {
        let caps = &self.config.caps;
        if self.limiter.count() >= caps.max_concurrent_jobs {
            return Ok(0);
        }

        // Capped types are left out of the query so they cannot fill the batch
        let capped: Vec<String> = self
            .handlers
            .keys()
            .filter(|job_type| !self.limiter.has_capacity(job_type, caps))
            .cloned()
            .collect();

        let mut dispatched = 0;
        for candidate in self.jobs.next_queued(self.config.poll_batch, &capped).await? {
            let job_type = candidate.job_type.as_str().to_string();
            let handler = self.handlers.get(&job_type).cloned();
            if handler.is_some() && !self.limiter.has_capacity(&job_type, caps) {
                continue;
            }

            let job = match self.jobs.claim(&candidate.id).await {
                Ok(job) => job,
                Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                    debug!(job_id = %candidate.id, "Job no longer claimable");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(handler) = handler else {
                warn!(job_id = %job.id, job_type = %job_type, "No handler registered");
                let detail = format!("no handler registered for job type {}", job_type);
                self.jobs
                    .complete(&job.id, JobOutcome::Failed, Some(&detail))
                    .await?;
                continue;
            };

            if job.cancel_requested {
                let completion = JobCompletion {
                    outcome: JobOutcome::Cancelled,
                    detail: Some(CANCELLED_BEFORE_START.to_string()),
                };
                if let Err(e) = handler.finalize_abandoned(&job, &completion).await {
                    warn!(job_id = %job.id, error = %e, "Handler could not finalise cancelled job");
                }
                self.jobs
                    .complete(&job.id, completion.outcome, completion.detail.as_deref())
                    .await?;
                continue;
            }

            let permit = self.limiter.acquire(&job_type);
            tasks.spawn(execute_job(Arc::clone(&self.jobs), handler, job, permit));
            dispatched += 1;

            if self.limiter.count() >= caps.max_concurrent_jobs {
                break;
            }
        }
        Ok(dispatched)
    }
}

/// Run one claimed job and record its outcome. The permit is released when
/// this returns, whatever the handler did.
async fn execute_job(
    jobs: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    job: Job,
    permit: InflightPermit,
) {
    let job = Arc::new(job);
    info!(job_id = %job.id, job_type = %job.job_type, "Executing job");

    // Separate task so a handler panic surfaces as a JoinError instead of
    // taking the completion bookkeeping down with it
    let exec_handler = Arc::clone(&handler);
    let exec_job = Arc::clone(&job);
    let handle = tokio::spawn(async move { exec_handler.execute(&exec_job).await });

    let completion = match handle.await {
        Ok(Ok(completion)) => completion,
        Ok(Err(e)) => {
            error!(job_id = %job.id, error = %e, "Job handler failed");
            JobCompletion::failed(e.to_string())
        }
        Err(join_err) => {
            let detail = if join_err.is_panic() {
                error!(job_id = %job.id, "Job handler panicked");
                "job handler panicked".to_string()
            } else {
                error!(job_id = %job.id, "Job handler task cancelled");
                "job handler task cancelled".to_string()
            };
            let completion = JobCompletion::failed(detail);
            if let Err(e) = handler.finalize_abandoned(&job, &completion).await {
                warn!(job_id = %job.id, error = %e, "Handler could not finalise abandoned job");
            }
            completion
        }
    };

    if let Err(e) = jobs
        .complete(&job.id, completion.outcome, completion.detail.as_deref())
        .await
    {
        error!(job_id = %job.id, error = %e, "Failed to record job outcome");
    }
    drop(permit);
}

fn log_task_exit(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Job task ended abnormally");
    }
}
