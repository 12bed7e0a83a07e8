// cratedig Infrastructure - SQLite Adapter
// Implements: JobRepository, ScanRunRepository, LibraryFileStore, LibraryIngestion

mod connection;
mod error;
mod ingestion;
mod job_repository;
mod library_file_store;
mod migration;
mod scan_run_repository;

pub use connection::{create_pool, database_url};
pub use ingestion::{layout_of, SqliteLayoutIngestion, TrackLayout, UNKNOWN_ALBUM, UNKNOWN_ARTIST};
pub use job_repository::SqliteJobRepository;
pub use library_file_store::SqliteLibraryFileStore;
pub use migration::run_migrations;
pub use scan_run_repository::SqliteScanRunRepository;
