// Port Layer - Interfaces for external dependencies

pub mod file_walker;
pub mod id_provider; // For deterministic testing
pub mod ingestion;
pub mod job_handler;
pub mod job_repository;
pub mod library_file_store;
pub mod scan_run_repository;
pub mod time_provider;

// Re-exports
pub use file_walker::{FileWalker, MediaFilter, WalkOptions, WalkOutcome};
pub use id_provider::IdProvider;
pub use ingestion::LibraryIngestion;
pub use job_handler::{JobCompletion, JobHandler};
pub use job_repository::JobRepository;
pub use library_file_store::LibraryFileStore;
pub use scan_run_repository::ScanRunRepository;
pub use time_provider::TimeProvider;
