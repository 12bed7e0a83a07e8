// Library Ingestion Port
// Turns discovered files into artist/album/track records. Opaque to the scan pipeline.

use crate::domain::{IngestionInput, IngestionStats};
use crate::error::Result;
use async_trait::async_trait;

/// Ingestion collaborator
///
/// Must be idempotent enough that a re-run with `process_only_unprocessed = true`
/// does not duplicate records that a previous run already created.
#[async_trait]
pub trait LibraryIngestion: Send + Sync {
    /// Ingest the files persisted for `input.library_id`
    ///
    /// # Errors
    /// - AppError::Ingestion when the collaborator fails as a whole
    async fn run(&self, input: &IngestionInput) -> Result<IngestionStats>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Ingestion stub returning a fixed result and recording its inputs
    pub struct StubIngestion {
        result: std::result::Result<IngestionStats, String>,
        calls: Mutex<Vec<IngestionInput>>,
    }

    impl StubIngestion {
        pub fn succeeding(stats: IngestionStats) -> Self {
            Self {
                result: Ok(stats),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                result: Err(message.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<IngestionInput> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LibraryIngestion for StubIngestion {
        async fn run(&self, input: &IngestionInput) -> Result<IngestionStats> {
            self.calls.lock().unwrap().push(input.clone());
            self.result.clone().map_err(AppError::Ingestion)
        }
    }
}
