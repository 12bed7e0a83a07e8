// Library scan pipeline

pub mod cancel;
pub mod config;
pub mod handler;
pub mod orchestrator;
pub mod service;

pub use cancel::{build_cancel_response, CancelPoll, CancelScanResponse, JobCancelPoll};
pub use config::ScanConfig;
pub use handler::ScanJobHandler;
pub use orchestrator::ScanOrchestrator;
pub use service::{ScanService, ScanStatusResponse, StartScanRequest, StartScanResponse};
