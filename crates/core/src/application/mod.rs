// Application Layer - Use Cases and Business Logic

pub mod batch_writer;
pub mod job_queue;
pub mod limiter;
pub mod recovery;
pub mod scan;
pub mod worker;

// Re-exports
pub use batch_writer::{BatchWriter, WriterStats};
pub use job_queue::{CancelRequestResult, JobQueue};
pub use limiter::{AdmissionCaps, InflightLimiter, InflightPermit};
pub use recovery::RecoveryService;
pub use scan::{ScanConfig, ScanJobHandler, ScanOrchestrator, ScanService};
pub use worker::{shutdown_channel, SchedulerConfig, ShutdownSender, ShutdownToken, Worker};
