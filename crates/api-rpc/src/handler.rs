//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params to the scan facade and job queue.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::types::{
    CancelScanResponse, JobCounts, ScanIdRequest, ScanStatusResponse, StartScanRequest,
    StartScanResponse, StatsRequest, StatsResponse,
};
use cratedig_core::application::{InflightLimiter, JobQueue, ScanService};
use cratedig_core::domain::JobState;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    scans: Arc<ScanService>,
    jobs: Arc<JobQueue>,
    inflight: Arc<InflightLimiter>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        scans: Arc<ScanService>,
        jobs: Arc<JobQueue>,
        inflight: Arc<InflightLimiter>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            scans,
            jobs,
            inflight,
            rate_limiter: RateLimiter::new(rate_limit),
            start_time: Instant::now(),
        }
    }

    fn admit(&self, method: &str) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            warn!(method, "Request throttled");
            Err(throttled())
        }
    }

    async fn count(&self, state: JobState) -> Result<i64, ErrorObjectOwned> {
        self.jobs.count_by_state(state).await.map_err(to_rpc_error)
    }

    /// scan.start.v1
    pub async fn start_scan(
        &self,
        params: StartScanRequest,
    ) -> Result<StartScanResponse, ErrorObjectOwned> {
        self.admit("scan.start.v1")?;
        self.scans.start_scan(params).await.map_err(to_rpc_error)
    }

    /// scan.status.v1
    pub async fn scan_status(
        &self,
        params: ScanIdRequest,
    ) -> Result<ScanStatusResponse, ErrorObjectOwned> {
        self.admit("scan.status.v1")?;
        self.scans
            .status(&params.scan_id)
            .await
            .map_err(to_rpc_error)
    }

    /// scan.cancel.v1
    ///
    /// Unknown and finished scans answer `cancelled: false` rather than an error.
    pub async fn cancel_scan(
        &self,
        params: ScanIdRequest,
    ) -> Result<CancelScanResponse, ErrorObjectOwned> {
        self.admit("scan.cancel.v1")?;
        let response = self
            .scans
            .cancel(&params.scan_id)
            .await
            .map_err(to_rpc_error)?;
        debug!(scan_id = %response.scan_id, cancelled = response.cancelled, "Cancel handled");
        Ok(response)
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let jobs = JobCounts {
            queued: self.count(JobState::Queued).await?,
            running: self.count(JobState::Running).await?,
            succeeded: self.count(JobState::Succeeded).await?,
            failed: self.count(JobState::Failed).await?,
            cancelled: self.count(JobState::Cancelled).await?,
        };

        Ok(StatsResponse {
            jobs,
            inflight: self.inflight.snapshot(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: cratedig_core::VERSION.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use cratedig_core::application::ScanConfig;
    use cratedig_core::domain::ScanState;
    use cratedig_core::port::id_provider::mocks::SequentialIdProvider;
    use cratedig_core::port::job_repository::mocks::InMemoryJobRepository;
    use cratedig_core::port::scan_run_repository::mocks::InMemoryScanRunRepository;
    use cratedig_core::port::time_provider::mocks::ManualTimeProvider;
    use std::path::PathBuf;
    use tokio_test::{assert_err, assert_ok};

    fn handler(rate_limit: RateLimitConfig) -> RpcHandler {
        let repo = Arc::new(InMemoryJobRepository::new());
        let ids = Arc::new(SequentialIdProvider::new("id"));
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let jobs = Arc::new(JobQueue::new(repo, ids.clone(), clock.clone()));
        let config = ScanConfig {
            allowed_roots: vec![PathBuf::from("/music")],
            ..Default::default()
        };
        let scans = Arc::new(ScanService::new(
            jobs.clone(),
            Arc::new(InMemoryScanRunRepository::new()),
            ids,
            clock,
            &config,
        ));
        RpcHandler::new(scans, jobs, Arc::new(InflightLimiter::new()), rate_limit)
    }

    fn start_request(path: &str) -> StartScanRequest {
        StartScanRequest {
            user_id: "user-1".into(),
            library_id: "lib-1".into(),
            paths: vec![PathBuf::from(path)],
            process_only_unprocessed: false,
        }
    }

    #[tokio::test]
    async fn test_start_then_status() {
        let handler = handler(RateLimitConfig::default());
        let started = assert_ok!(handler.start_scan(start_request("/music/jazz")).await);

        let status = handler
            .scan_status(ScanIdRequest {
                scan_id: started.scan_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(status.state, ScanState::Queued);

        let stats = handler.stats(StatsRequest::default()).await.unwrap();
        assert_eq!(stats.jobs.queued, 1);
        assert_eq!(stats.inflight.global, 0);
    }

    #[tokio::test]
    async fn test_path_violation_is_reported() {
        let handler = handler(RateLimitConfig::default());
        let err = assert_err!(handler.start_scan(start_request("/etc")).await);
        assert_eq!(err.code(), code::PATH_VIOLATION);
    }

    #[tokio::test]
    async fn test_cancel_unknown_scan_is_not_an_error() {
        let handler = handler(RateLimitConfig::default());
        let response = handler
            .cancel_scan(ScanIdRequest {
                scan_id: "nope".into(),
            })
            .await
            .unwrap();
        assert!(!response.cancelled);
        assert_eq!(response.reason.as_deref(), Some("not_cancellable"));
    }

    #[tokio::test]
    async fn test_requests_are_throttled() {
        let handler = handler(RateLimitConfig {
            burst: 1,
            per_second: 1,
        });
        let request = || ScanIdRequest {
            scan_id: "nope".into(),
        };

        assert!(handler.cancel_scan(request()).await.is_ok());
        let err = handler.cancel_scan(request()).await.unwrap_err();
        assert_eq!(err.code(), code::THROTTLED);
    }
}
