// Scan Service - start, status and cancel use cases

use super::cancel::{build_cancel_response, CancelScanResponse};
use super::config::ScanConfig;
use crate::application::job_queue::{EnqueueRequest, JobQueue};
use crate::domain::{
    is_path_inside_allowed_roots, is_single_folder, JobId, ScanCounts, ScanId, ScanParams,
    ScanRun, ScanState, ScanStats, SCAN_DIRECTORY_JOB,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ScanRunRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub user_id: String,
    pub library_id: String,
    /// Items selected for scanning; must name exactly one folder
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub process_only_unprocessed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub scan_id: ScanId,
    pub job_id: JobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatusResponse {
    pub scan_id: ScanId,
    pub state: ScanState,
    /// Latest progress blob of the backing job
    pub progress: serde_json::Value,
    pub counts: ScanCounts,
    pub errors: Vec<String>,
    pub last_error: Option<String>,
    pub stats: Option<ScanStats>,
}

pub struct ScanService {
    jobs: Arc<JobQueue>,
    scan_runs: Arc<dyn ScanRunRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    allowed_roots: Vec<PathBuf>,
}

impl ScanService {
    pub fn new(
        jobs: Arc<JobQueue>,
        scan_runs: Arc<dyn ScanRunRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: &ScanConfig,
    ) -> Self {
        Self {
            jobs,
            scan_runs,
            id_provider,
            time_provider,
            allowed_roots: config.allowed_roots.clone(),
        }
    }

    /// Record a ScanRun and enqueue its backing job.
    ///
    /// # Errors
    /// - AppError::Validation for a multi-item selection or missing ids
    /// - AppError::PathViolation when the folder is outside every allowed root
    pub async fn start_scan(&self, req: StartScanRequest) -> Result<StartScanResponse> {
        if req.user_id.trim().is_empty() || req.library_id.trim().is_empty() {
            return Err(AppError::Validation(
                "user_id and library_id are required".to_string(),
            ));
        }
        if !is_single_folder(&req.paths) {
            return Err(AppError::Validation(format!(
                "select exactly one folder to scan, got {}",
                req.paths.len()
            )));
        }
        let root_path = req.paths[0].clone();
        if !is_path_inside_allowed_roots(&root_path, &self.allowed_roots) {
            return Err(AppError::PathViolation(format!(
                "{} is not inside an allowed library root",
                root_path.display()
            )));
        }

        let scan_id = self.id_provider.generate_id();
        let job_id = self.id_provider.generate_id();
        let params = ScanParams {
            scan_id: scan_id.clone(),
            user_id: req.user_id,
            library_id: req.library_id,
            root_path,
            allowed_roots: self.allowed_roots.clone(),
            process_only_unprocessed: req.process_only_unprocessed,
        };

        let payload = serde_json::to_value(&params)?;

        // The run exists before the job so a worker never claims a job without one
        let run = ScanRun::new(
            scan_id.clone(),
            job_id.clone(),
            &params,
            self.time_provider.now_millis(),
        );
        self.scan_runs.insert(&run).await?;
        let enqueued = self
            .jobs
            .enqueue_request(EnqueueRequest {
                job_id: Some(job_id.clone()),
                job_type: SCAN_DIRECTORY_JOB.to_string(),
                payload,
            })
            .await;
        if let Err(e) = enqueued {
            warn!(scan_id = %scan_id, job_id = %job_id, error = %e, "Enqueue failed, failing scan run");
            self.fail_unqueued_run(run, &e).await;
            return Err(e);
        }

        info!(
            scan_id = %scan_id,
            job_id = %job_id,
            library_id = %params.library_id,
            root = %params.root_path.display(),
            "Scan accepted"
        );
        Ok(StartScanResponse { scan_id, job_id })
    }

    /// A run whose job never reached the queue would stay `queued` forever
    async fn fail_unqueued_run(&self, mut run: ScanRun, cause: &AppError) {
        let message = format!("enqueue failed: {}", cause);
        run.record_error(message.clone());
        let stats = ScanStats {
            counts: run.counts,
            ingestion: None,
        };
        let finished = run.finish(
            ScanState::Failed,
            Some(message),
            Some(stats),
            self.time_provider.now_millis(),
        );
        let result = match finished {
            Ok(()) => self.scan_runs.update(&run).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(scan_id = %run.scan_id, error = %e, "Could not fail unqueued scan run");
        }
    }

    pub async fn status(&self, scan_id: &ScanId) -> Result<ScanStatusResponse> {
        let run = self
            .scan_runs
            .find_by_id(scan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("scan {}", scan_id)))?;
        let progress = self
            .jobs
            .get(&run.job_id)
            .await?
            .map(|job| job.progress)
            .unwrap_or(serde_json::Value::Null);

        Ok(ScanStatusResponse {
            scan_id: run.scan_id,
            state: run.state,
            progress,
            counts: run.counts,
            errors: run.error_messages,
            last_error: run.last_error,
            stats: run.stats,
        })
    }

    /// Request cancellation. Unknown or finished scans report `not_cancellable`.
    pub async fn cancel(&self, scan_id: &ScanId) -> Result<CancelScanResponse> {
        let result = match self.scan_runs.find_by_id(scan_id).await? {
            Some(run) => self.jobs.request_cancel(&run.job_id).await?,
            None => None,
        };
        Ok(build_cancel_response(scan_id.clone(), result.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::scan_run_repository::mocks::InMemoryScanRunRepository;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use tokio_test::{assert_err, assert_ok};

    fn service() -> (ScanService, Arc<JobQueue>) {
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let ids = Arc::new(SequentialIdProvider::new("id"));
        let jobs = Arc::new(JobQueue::new(
            Arc::new(InMemoryJobRepository::new()),
            ids.clone(),
            clock.clone(),
        ));
        let config = ScanConfig {
            allowed_roots: vec![PathBuf::from("/music/library")],
            ..Default::default()
        };
        let service = ScanService::new(
            jobs.clone(),
            Arc::new(InMemoryScanRunRepository::new()),
            ids,
            clock,
            &config,
        );
        (service, jobs)
    }

    fn request(paths: &[&str]) -> StartScanRequest {
        StartScanRequest {
            user_id: "user-1".into(),
            library_id: "lib-1".into(),
            paths: paths.iter().map(PathBuf::from).collect(),
            process_only_unprocessed: false,
        }
    }

    #[tokio::test]
    async fn test_start_scan_creates_run_and_job() {
        let (service, jobs) = service();
        let response = assert_ok!(service.start_scan(request(&["/music/library/albums"])).await);
        assert_eq!(response.scan_id, "id-1");
        assert_eq!(response.job_id, "id-2");

        let job = jobs.get(&response.job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.job_type.as_str(), SCAN_DIRECTORY_JOB);
        let params: ScanParams = serde_json::from_value(job.payload.as_value().clone()).unwrap();
        assert_eq!(params.scan_id, response.scan_id);

        let status = assert_ok!(service.status(&response.scan_id).await);
        assert_eq!(status.state, ScanState::Queued);
        assert_eq!(status.counts, ScanCounts::default());
    }

    #[tokio::test]
    async fn test_enqueue_failure_fails_the_run() {
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let ids = Arc::new(SequentialIdProvider::new("id"));
        let job_repo = Arc::new(InMemoryJobRepository::new());
        let scan_runs = Arc::new(InMemoryScanRunRepository::new());
        let jobs = Arc::new(JobQueue::new(job_repo.clone(), ids.clone(), clock.clone()));
        let config = ScanConfig {
            allowed_roots: vec![PathBuf::from("/music/library")],
            ..Default::default()
        };
        let service = ScanService::new(jobs.clone(), scan_runs.clone(), ids, clock, &config);
        job_repo.set_fail_writes(true);

        let err = assert_err!(service.start_scan(request(&["/music/library/albums"])).await);
        assert!(matches!(err, AppError::Database(_)));

        let run = scan_runs.find_by_id(&"id-1".to_string()).await.unwrap().unwrap();
        assert_eq!(run.state, ScanState::Failed);
        assert!(run.last_error.unwrap().contains("enqueue failed"));
        assert!(jobs.get(&"id-2".to_string()).await.unwrap().is_none());

        let status = assert_ok!(service.status(&"id-1".to_string()).await);
        assert_eq!(status.state, ScanState::Failed);
        assert_eq!(status.counts.errors, 1);
    }

    #[tokio::test]
    async fn test_start_scan_rejects_multi_selection() {
        let (service, _) = service();
        let err = assert_err!(
            service
                .start_scan(request(&["/music/library/a", "/music/library/b"]))
                .await
        );
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_start_scan_rejects_sibling_prefix_root() {
        let (service, _) = service();
        let err = assert_err!(service.start_scan(request(&["/music/library-archive"])).await);
        assert!(matches!(err, AppError::PathViolation(_)));
    }

    #[tokio::test]
    async fn test_cancel_unknown_scan_is_not_cancellable() {
        let (service, _) = service();
        let response = assert_ok!(service.cancel(&"nope".to_string()).await);
        assert!(!response.cancelled);
        assert_eq!(response.reason.as_deref(), Some("not_cancellable"));
    }

    #[tokio::test]
    async fn test_cancel_queued_scan_raises_job_flag() {
        let (service, jobs) = service();
        let started = service
            .start_scan(request(&["/music/library"]))
            .await
            .unwrap();

        let response = assert_ok!(service.cancel(&started.scan_id).await);
        assert!(response.cancelled);
        assert!(jobs.is_cancel_requested(&started.job_id).await.unwrap());
    }
}
