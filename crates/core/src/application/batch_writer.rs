// Batch Persistence Writer
//
// Buffers discovered files for one scan and writes them to the library file
// store one batch per storage operation. Owned by a single orchestrator run.

use crate::domain::FileEntry;
use crate::error::{AppError, Result};
use crate::port::LibraryFileStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Cumulative writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub persisted: u64,
    pub batches_flushed: u64,
}

pub struct BatchWriter {
    store: Arc<dyn LibraryFileStore>,
    library_id: String,
    threshold: usize,
    buffer: Vec<FileEntry>,
    stats: WriterStats,
}

impl BatchWriter {
    /// `threshold` below 1 is treated as 1
    pub fn new(store: Arc<dyn LibraryFileStore>, library_id: impl Into<String>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            library_id: library_id.into(),
            threshold,
            buffer: Vec::with_capacity(threshold),
            stats: WriterStats::default(),
        }
    }

    /// Append to the buffer, returning the new buffer size
    pub fn add(&mut self, entry: FileEntry) -> usize {
        self.buffer.push(entry);
        self.buffer.len()
    }

    /// Entries added since the last successful flush
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.threshold
    }

    /// Write the whole buffer in one storage operation.
    ///
    /// Returns the number of records written; an empty buffer writes nothing and
    /// returns 0. On failure the buffer is left untouched so the caller may
    /// retry the same batch. The writer itself never retries.
    ///
    /// # Errors
    /// - AppError::Flush wrapping the store failure
    pub async fn flush(&mut self) -> Result<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let written = self
            .store
            .write_batch(&self.library_id, &self.buffer)
            .await
            .map_err(|e| AppError::Flush(e.to_string()))?;

        self.buffer.clear();
        if written > 0 {
            self.stats.batches_flushed += 1;
            self.stats.persisted += written;
        }

        debug!(
            library_id = %self.library_id,
            written,
            batches_flushed = self.stats.batches_flushed,
            "Batch flushed"
        );
        Ok(written)
    }
}
