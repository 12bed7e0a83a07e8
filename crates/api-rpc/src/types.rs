//! RPC Request/Response Types
//!
//! `scan.start.v1`, `scan.status.v1` and `scan.cancel.v1` reuse the application
//! facade's request and response structs; only the envelopes below are RPC-specific.

use cratedig_core::application::limiter::LimiterSnapshot;
use serde::{Deserialize, Serialize};

pub use cratedig_core::application::scan::{
    CancelScanResponse, ScanStatusResponse, StartScanRequest, StartScanResponse,
};

/// scan.status.v1 / scan.cancel.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanIdRequest {
    pub scan_id: String,
}

/// admin.stats.v1 - no parameters
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {}

/// Jobs per state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub queued: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub jobs: JobCounts,
    /// In-flight jobs as seen by the worker's limiter
    pub inflight: LimiterSnapshot,
    pub uptime_seconds: u64,
    pub version: String,
}
