// Library File Store Port (batch persistence of discovered files)

use crate::domain::FileEntry;
use crate::error::Result;
use async_trait::async_trait;

/// Durable store for discovered library files
#[async_trait]
pub trait LibraryFileStore: Send + Sync {
    /// Upsert `entries` for `library_id` in ONE storage operation.
    ///
    /// All-or-nothing: on error nothing from the batch is visible. Re-writing a
    /// path that already exists updates it in place instead of duplicating it.
    /// Returns the number of records written.
    async fn write_batch(&self, library_id: &str, entries: &[FileEntry]) -> Result<u64>;

    /// Number of stored files for a library
    async fn count_files(&self, library_id: &str) -> Result<i64>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store with failure injection
    #[derive(Default)]
    pub struct InMemoryLibraryFileStore {
        files: Mutex<BTreeMap<(String, PathBuf), FileEntry>>,
        batches: Mutex<Vec<Vec<PathBuf>>>,
        failures_remaining: AtomicUsize,
    }

    impl InMemoryLibraryFileStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `count` batch writes
        pub fn fail_next_writes(&self, count: usize) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Paths of every successful batch, in write order
        pub fn batches(&self) -> Vec<Vec<PathBuf>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LibraryFileStore for InMemoryLibraryFileStore {
        async fn write_batch(&self, library_id: &str, entries: &[FileEntry]) -> Result<u64> {
            let should_fail = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(AppError::Database("disk I/O error".to_string()));
            }

            let mut files = self.files.lock().unwrap();
            for entry in entries {
                files.insert((library_id.to_string(), entry.path.clone()), entry.clone());
            }
            self.batches
                .lock()
                .unwrap()
                .push(entries.iter().map(|e| e.path.clone()).collect());
            Ok(entries.len() as u64)
        }

        async fn count_files(&self, library_id: &str) -> Result<i64> {
            let files = self.files.lock().unwrap();
            Ok(files.keys().filter(|(lib, _)| lib == library_id).count() as i64)
        }
    }
}
