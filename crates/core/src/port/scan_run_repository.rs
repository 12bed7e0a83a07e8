// ScanRun Repository Port (Interface)

use crate::domain::{JobId, ScanId, ScanRun};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for ScanRun persistence
#[async_trait]
pub trait ScanRunRepository: Send + Sync {
    async fn insert(&self, run: &ScanRun) -> Result<()>;

    async fn find_by_id(&self, scan_id: &ScanId) -> Result<Option<ScanRun>>;

    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<ScanRun>>;

    /// Persist state, counters, error messages and stats.
    ///
    /// Returns `false` without writing when the stored run is already terminal.
    async fn update(&self, run: &ScanRun) -> Result<bool>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryScanRunRepository {
        runs: Mutex<HashMap<ScanId, ScanRun>>,
        updates: Mutex<Vec<ScanRun>>,
    }

    impl InMemoryScanRunRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every accepted update, in order
        pub fn update_history(&self) -> Vec<ScanRun> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScanRunRepository for InMemoryScanRunRepository {
        async fn insert(&self, run: &ScanRun) -> Result<()> {
            self.runs
                .lock()
                .unwrap()
                .insert(run.scan_id.clone(), run.clone());
            Ok(())
        }

        async fn find_by_id(&self, scan_id: &ScanId) -> Result<Option<ScanRun>> {
            Ok(self.runs.lock().unwrap().get(scan_id).cloned())
        }

        async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<ScanRun>> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .values()
                .find(|run| &run.job_id == job_id)
                .cloned())
        }

        async fn update(&self, run: &ScanRun) -> Result<bool> {
            let mut runs = self.runs.lock().unwrap();
            match runs.get(&run.scan_id) {
                Some(stored) if !stored.state.is_terminal() => {
                    runs.insert(run.scan_id.clone(), run.clone());
                    self.updates.lock().unwrap().push(run.clone());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
