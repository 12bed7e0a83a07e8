// File Walker Port (lazy directory traversal)

use crate::domain::{FileEntry, WalkEntryError};
use std::collections::BTreeSet;
use std::path::Path;

/// Audio extensions accepted when no explicit set is configured
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "aac", "wav", "aif", "aiff", "wma", "ape", "wv",
];

/// Extension predicate deciding which regular files are yielded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFilter {
    extensions: BTreeSet<String>,
}

impl MediaFilter {
    /// Build from extensions with or without a leading dot, any case
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Lower-cased extension of `path` if the filter accepts it
    pub fn accept(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extensions.contains(&ext).then_some(ext)
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIA_EXTENSIONS)
    }
}

/// Traversal options
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Directory names not descended into (exact name, case-insensitive)
    pub ignore_directories: Vec<String>,
    /// Stop after this many files have been yielded
    pub max_files: Option<usize>,
    pub media: MediaFilter,
}

impl WalkOptions {
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignore_directories
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(name))
    }
}

/// One step of a traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    File(FileEntry),
    /// Entry could not be read; traversal continues with its siblings
    Skipped(WalkEntryError),
}

/// Lazy, pull-based directory traversal
///
/// Each call to `walk` starts a fresh depth-first traversal with siblings in
/// file-name order. No work happens between pulls, so a consumer cancels simply
/// by dropping the iterator.
pub trait FileWalker: Send + Sync {
    fn walk(
        &self,
        root: &Path,
        options: &WalkOptions,
    ) -> Box<dyn Iterator<Item = WalkOutcome> + Send>;
}

/// Callback form: yields only files, reporting skipped entries to `on_error`
pub fn files_with_errors<I, F>(outcomes: I, mut on_error: F) -> impl Iterator<Item = FileEntry>
where
    I: Iterator<Item = WalkOutcome>,
    F: FnMut(&WalkEntryError),
{
    outcomes.filter_map(move |outcome| match outcome {
        WalkOutcome::File(entry) => Some(entry),
        WalkOutcome::Skipped(err) => {
            on_error(&err);
            None
        }
    })
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays a fixed outcome list, counting how many outcomes were pulled
    pub struct StaticWalker {
        outcomes: Vec<WalkOutcome>,
        pulled: Arc<AtomicUsize>,
    }

    impl StaticWalker {
        pub fn new(outcomes: Vec<WalkOutcome>) -> Self {
            Self {
                outcomes,
                pulled: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Walker yielding one file per path, 1 KiB each
        pub fn with_files<I, P>(paths: I) -> Self
        where
            I: IntoIterator<Item = P>,
            P: AsRef<Path>,
        {
            let outcomes = paths
                .into_iter()
                .map(|path| {
                    let path = path.as_ref().to_path_buf();
                    let extension = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    WalkOutcome::File(FileEntry {
                        path,
                        size_bytes: 1024,
                        mtime_ms: 1_700_000_000_000,
                        extension,
                    })
                })
                .collect();
            Self::new(outcomes)
        }

        pub fn pulled(&self) -> usize {
            self.pulled.load(Ordering::SeqCst)
        }
    }

    impl FileWalker for StaticWalker {
        fn walk(
            &self,
            _root: &Path,
            options: &WalkOptions,
        ) -> Box<dyn Iterator<Item = WalkOutcome> + Send> {
            let pulled = Arc::clone(&self.pulled);
            let max_files = options.max_files.unwrap_or(usize::MAX);
            let mut files_seen = 0usize;
            let iter = self
                .outcomes
                .clone()
                .into_iter()
                .take_while(move |outcome| {
                    if matches!(outcome, WalkOutcome::File(_)) {
                        files_seen += 1;
                        return files_seen <= max_files;
                    }
                    true
                })
                .inspect(move |_| {
                    pulled.fetch_add(1, Ordering::SeqCst);
                });
            Box::new(iter)
        }
    }
}
