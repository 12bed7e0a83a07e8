// Domain Layer - Pure business logic and entities

pub mod error;
pub mod file_entry;
pub mod job;
pub mod path_safety;
pub mod scan;

// Re-exports
pub use error::DomainError;
pub use file_entry::{FileEntry, WalkEntryError};
pub use job::{Job, JobId, JobOutcome, JobPayload, JobState, JobType, SCAN_DIRECTORY_JOB};
pub use path_safety::{is_path_inside_allowed_roots, is_path_inside_root, is_single_folder};
pub use scan::{
    IngestionInput, IngestionStats, ScanCounts, ScanId, ScanParams, ScanProgress, ScanReport,
    ScanRun, ScanStage, ScanState, ScanStats,
};
