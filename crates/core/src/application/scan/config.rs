// Scan configuration

use crate::error::{AppError, Result};
use crate::port::file_walker::DEFAULT_MEDIA_EXTENSIONS;
use crate::port::{MediaFilter, WalkOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Files per batch write
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Discovered files between two progress publications
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 250;

/// Minimum spacing between two cancel-flag reads against the store
pub const DEFAULT_CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Directory names never descended into
pub const DEFAULT_IGNORE_DIRECTORIES: &[&str] = &[".git", "@eaDir", "#recycle", ".Trash-1000"];

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub batch_size: usize,
    pub progress_interval: u64,
    /// Attempts per batch write, 1 = no retry. The buffer is kept between attempts.
    pub flush_attempts: u32,
    pub cancel_poll_interval: Duration,
    pub ignore_directories: Vec<String>,
    pub media_extensions: Vec<String>,
    pub max_files: Option<usize>,
    /// Library roots a scan root must lie within
    pub allowed_roots: Vec<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            flush_attempts: 1,
            cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
            ignore_directories: DEFAULT_IGNORE_DIRECTORIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            media_extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_files: None,
            allowed_roots: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }
        if self.flush_attempts == 0 {
            return Err(AppError::Config(
                "flush_attempts must be at least 1".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(AppError::Config(
                "progress_interval must be at least 1".to_string(),
            ));
        }
        if self.media_extensions.is_empty() {
            return Err(AppError::Config("media_extensions is empty".to_string()));
        }
        Ok(())
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            ignore_directories: self.ignore_directories.clone(),
            max_files: self.max_files,
            media: MediaFilter::new(&self.media_extensions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flush_attempts, 1);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = ScanConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_walk_options_carry_filters() {
        let config = ScanConfig {
            media_extensions: vec!["flac".into()],
            max_files: Some(7),
            ..Default::default()
        };
        let options = config.walk_options();
        assert_eq!(options.max_files, Some(7));
        assert!(options.is_ignored_dir("@eaDir"));
        assert!(options.media.accept(Path::new("a.FLAC")).is_some());
        assert!(options.media.accept(Path::new("a.mp3")).is_none());
    }
}
