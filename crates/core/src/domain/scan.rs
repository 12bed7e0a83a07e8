// Scan Domain Model
//
// A ScanRun is the scan-domain view of one directory scan; the Job that backs it
// (1:1) is the execution-domain record.

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{JobId, JobOutcome};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Scan ID (UUID v4)
pub type ScanId = String;

/// Upper bound on error messages retained on a ScanRun (newest kept)
pub const MAX_ERROR_MESSAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Queued => "queued",
            ScanState::Running => "running",
            ScanState::Succeeded => "succeeded",
            ScanState::Failed => "failed",
            ScanState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Succeeded | ScanState::Failed | ScanState::Cancelled
        )
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(ScanState::Queued),
            "running" => Ok(ScanState::Running),
            "succeeded" => Ok(ScanState::Succeeded),
            "failed" => Ok(ScanState::Failed),
            "cancelled" => Ok(ScanState::Cancelled),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// Live counters of a scan run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub files_discovered: u64,
    pub files_persisted: u64,
    pub batches_flushed: u64,
    pub errors: u64,
}

/// Input handed to the ingestion collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionInput {
    pub library_id: String,
    pub library_path: PathBuf,
    pub user_id: String,
    pub process_only_unprocessed: bool,
}

/// Stats returned by the ingestion collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub scanned_files: u64,
    pub added_tracks: u64,
    pub added_artists: u64,
    pub added_albums: u64,
    pub skipped_files: u64,
    pub errors: u64,
}

/// Final aggregate of walker/writer counters and ingestion stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    #[serde(flatten)]
    pub counts: ScanCounts,
    /// None when the scan ended before ingestion ran
    pub ingestion: Option<IngestionStats>,
}

/// Stage reported in the job progress blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Walking,
    Ingesting,
    Finished,
}

/// Progress blob stored on the backing Job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub stage: ScanStage,
    #[serde(flatten)]
    pub counts: ScanCounts,
}

/// Parameters of one scan, carried as the job payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParams {
    pub scan_id: ScanId,
    pub user_id: String,
    pub library_id: String,
    pub root_path: PathBuf,
    pub allowed_roots: Vec<PathBuf>,
    #[serde(default)]
    pub process_only_unprocessed: bool,
}

/// Deterministic result of one orchestrator invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: ScanId,
    pub state: ScanState,
    pub stats: ScanStats,
    pub last_error: Option<String>,
}

impl ScanReport {
    /// Job outcome matching this report's terminal state
    pub fn job_outcome(&self) -> JobOutcome {
        match self.state {
            ScanState::Succeeded => JobOutcome::Succeeded,
            ScanState::Cancelled => JobOutcome::Cancelled,
            _ => JobOutcome::Failed,
        }
    }
}

/// ScanRun Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    pub scan_id: ScanId,
    pub job_id: JobId,
    pub user_id: String,
    pub library_id: String,
    pub root_path: String,
    pub state: ScanState,
    pub counts: ScanCounts,
    pub error_messages: Vec<String>,
    pub last_error: Option<String>,
    pub stats: Option<ScanStats>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScanRun {
    pub fn new(
        scan_id: impl Into<String>,
        job_id: impl Into<String>,
        params: &ScanParams,
        created_at: i64,
    ) -> Self {
        Self {
            scan_id: scan_id.into(),
            job_id: job_id.into(),
            user_id: params.user_id.clone(),
            library_id: params.library_id.clone(),
            root_path: params.root_path.display().to_string(),
            state: ScanState::Queued,
            counts: ScanCounts::default(),
            error_messages: Vec::new(),
            last_error: None,
            stats: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ScanState::Queued {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: ScanState::Running.to_string(),
            });
        }
        self.state = ScanState::Running;
        self.updated_at = now_millis;
        Ok(())
    }

    pub fn record_discovered(&mut self) {
        self.counts.files_discovered += 1;
    }

    /// Account for one flush. A flush that wrote nothing is not a batch.
    pub fn record_flush(&mut self, written: u64) {
        if written == 0 {
            return;
        }
        self.counts.batches_flushed += 1;
        self.counts.files_persisted += written;
        debug_assert!(self.counts.files_persisted <= self.counts.files_discovered);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.counts.errors += 1;
        self.error_messages.push(message.into());
        if self.error_messages.len() > MAX_ERROR_MESSAGES {
            let overflow = self.error_messages.len() - MAX_ERROR_MESSAGES;
            self.error_messages.drain(..overflow);
        }
    }

    pub fn finish(
        &mut self,
        state: ScanState,
        last_error: Option<String>,
        stats: Option<ScanStats>,
        now_millis: i64,
    ) -> Result<()> {
        if self.state.is_terminal() || !state.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: state.to_string(),
            });
        }
        self.state = state;
        self.last_error = last_error;
        self.stats = stats;
        self.updated_at = now_millis;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScanParams {
        ScanParams {
            scan_id: "scan-1".into(),
            user_id: "user-1".into(),
            library_id: "lib-1".into(),
            root_path: PathBuf::from("/music/library"),
            allowed_roots: vec![PathBuf::from("/music")],
            process_only_unprocessed: false,
        }
    }

    #[test]
    fn test_empty_flush_is_not_a_batch() {
        let mut run = ScanRun::new("scan-1", "job-1", &params(), 1000);
        run.record_discovered();
        run.record_flush(0);
        assert_eq!(run.counts.batches_flushed, 0);

        run.record_flush(1);
        assert_eq!(run.counts.batches_flushed, 1);
        assert_eq!(run.counts.files_persisted, 1);
    }

    #[test]
    fn test_error_messages_are_capped() {
        let mut run = ScanRun::new("scan-1", "job-1", &params(), 1000);
        for i in 0..(MAX_ERROR_MESSAGES + 5) {
            run.record_error(format!("error {}", i));
        }
        assert_eq!(run.counts.errors, (MAX_ERROR_MESSAGES + 5) as u64);
        assert_eq!(run.error_messages.len(), MAX_ERROR_MESSAGES);
        assert_eq!(run.error_messages[0], "error 5");
    }

    #[test]
    fn test_terminal_scan_never_reopens() {
        let mut run = ScanRun::new("scan-1", "job-1", &params(), 1000);
        run.start(1100).unwrap();
        run.finish(ScanState::Cancelled, None, None, 1200).unwrap();

        assert!(run.start(1300).is_err());
        assert!(run.finish(ScanState::Failed, None, None, 1300).is_err());
        assert_eq!(run.state, ScanState::Cancelled);
    }

    #[test]
    fn test_progress_serializes_flat() {
        let progress = ScanProgress {
            stage: ScanStage::Walking,
            counts: ScanCounts {
                files_discovered: 4,
                files_persisted: 2,
                batches_flushed: 1,
                errors: 0,
            },
        };
        let value = serde_json::to_value(progress).unwrap();
        assert_eq!(value["stage"], "walking");
        assert_eq!(value["files_discovered"], 4);
        assert_eq!(value["batches_flushed"], 1);
    }
}
