// walkdir-backed FileWalker

use cratedig_core::domain::{FileEntry, WalkEntryError};
use cratedig_core::port::{FileWalker, MediaFilter, WalkOptions, WalkOutcome};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::trace;
use walkdir::{DirEntry, WalkDir};

/// Depth-first walker over the real filesystem
///
/// Siblings are visited in file-name order. Symlinks are not followed unless
/// configured, so a link loop cannot trap a scan.
#[derive(Debug, Clone, Default)]
pub struct WalkdirWalker {
    follow_links: bool,
}

impl WalkdirWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }
}

impl FileWalker for WalkdirWalker {
    fn walk(
        &self,
        root: &Path,
        options: &WalkOptions,
    ) -> Box<dyn Iterator<Item = WalkOutcome> + Send> {
        let ignore = options.clone();
        let inner = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !is_ignored(entry, &ignore));

        Box::new(MediaWalk {
            inner,
            media: options.media.clone(),
            remaining: options.max_files,
        })
    }
}

fn is_ignored(entry: &DirEntry, options: &WalkOptions) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| options.is_ignored_dir(name))
}

/// Pull-driven adapter: each `next` advances walkdir only until one outcome
/// is ready
struct MediaWalk<I> {
    inner: I,
    media: MediaFilter,
    remaining: Option<usize>,
}

impl<I> Iterator for MediaWalk<I>
where
    I: Iterator<Item = walkdir::Result<DirEntry>>,
{
    type Item = WalkOutcome;

    fn next(&mut self) -> Option<WalkOutcome> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            let outcome = match self.inner.next()? {
                Ok(entry) => match file_outcome(entry, &self.media) {
                    Some(outcome) => outcome,
                    None => continue,
                },
                Err(err) => WalkOutcome::Skipped(entry_error(&err)),
            };
            if let (WalkOutcome::File(_), Some(remaining)) = (&outcome, self.remaining.as_mut()) {
                *remaining -= 1;
            }
            return Some(outcome);
        }
    }
}

/// `None` for directories, non-regular files and non-media files
fn file_outcome(entry: DirEntry, media: &MediaFilter) -> Option<WalkOutcome> {
    if !entry.file_type().is_file() {
        return None;
    }
    let Some(extension) = media.accept(entry.path()) else {
        trace!(path = %entry.path().display(), "Not a media file");
        return None;
    };

    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(err) => return Some(WalkOutcome::Skipped(entry_error(&err))),
    };
    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .and_then(|since| i64::try_from(since.as_millis()).ok())
        .unwrap_or(0);

    Some(WalkOutcome::File(FileEntry {
        path: entry.into_path(),
        size_bytes: metadata.len(),
        mtime_ms,
        extension,
    }))
}

fn entry_error(err: &walkdir::Error) -> WalkEntryError {
    WalkEntryError {
        code: err
            .io_error()
            .map(|io| format!("{:?}", io.kind()))
            .unwrap_or_else(|| "walk".to_string()),
        path: err.path().map(Path::to_path_buf),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_core::port::file_walker::files_with_errors;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    fn relative(root: &Path, outcomes: impl Iterator<Item = WalkOutcome>) -> Vec<String> {
        outcomes
            .filter_map(|outcome| match outcome {
                WalkOutcome::File(entry) => Some(entry.path),
                WalkOutcome::Skipped(_) => None,
            })
            .map(|path: PathBuf| {
                path.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.mp3");
        touch(dir.path(), "ignore.txt");
        touch(dir.path(), "sub/b.flac");
        touch(dir.path(), "sub/deep/c.ogg");
        dir
    }

    #[test]
    fn test_walk_yields_media_files_depth_first() {
        let dir = sample_tree();
        let walker = WalkdirWalker::new();

        let files = relative(dir.path(), walker.walk(dir.path(), &WalkOptions::default()));
        assert_eq!(files, vec!["a.mp3", "sub/b.flac", "sub/deep/c.ogg"]);
    }

    #[test]
    fn test_each_walk_is_a_fresh_traversal() {
        let dir = sample_tree();
        let walker = WalkdirWalker::new();
        let options = WalkOptions::default();

        let first = relative(dir.path(), walker.walk(dir.path(), &options));
        let second = relative(dir.path(), walker.walk(dir.path(), &options));
        assert_eq!(first, second);
    }

    #[test]
    fn test_ignored_directories_are_not_descended() {
        let dir = sample_tree();
        touch(dir.path(), "@eaDir/thumb.mp3");
        let options = WalkOptions {
            ignore_directories: vec!["@EADIR".into(), "deep".into()],
            ..Default::default()
        };

        let files = relative(dir.path(), WalkdirWalker::new().walk(dir.path(), &options));
        assert_eq!(files, vec!["a.mp3", "sub/b.flac"]);
    }

    #[test]
    fn test_max_files_stops_early() {
        let dir = sample_tree();
        let options = WalkOptions {
            max_files: Some(2),
            ..Default::default()
        };

        let files = relative(dir.path(), WalkdirWalker::new().walk(dir.path(), &options));
        assert_eq!(files, vec!["a.mp3", "sub/b.flac"]);
    }

    #[test]
    fn test_file_metadata_is_captured() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Track.MP3");

        let entries: Vec<_> =
            files_with_errors(WalkdirWalker::new().walk(dir.path(), &WalkOptions::default()), |_| {})
                .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].extension, "mp3");
        assert_eq!(entries[0].size_bytes, 4);
        assert!(entries[0].mtime_ms > 0);
    }

    #[test]
    fn test_missing_root_is_reported_not_panicking() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");

        let outcomes: Vec<_> = WalkdirWalker::new()
            .walk(&missing, &WalkOptions::default())
            .collect();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            WalkOutcome::Skipped(err) => {
                assert_eq!(err.code, "NotFound");
                assert_eq!(err.path.as_deref(), Some(missing.as_path()));
            }
            other => panic!("expected skipped outcome, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_suppress_siblings() {
        use std::os::unix::fs::PermissionsExt;

        let dir = sample_tree();
        touch(dir.path(), "locked/hidden.mp3");
        touch(dir.path(), "z.mp3");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through permission bits; nothing to observe then
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let mut errors = Vec::new();
        let files: Vec<_> = files_with_errors(
            WalkdirWalker::new().walk(dir.path(), &WalkOptions::default()),
            |err| errors.push(err.clone()),
        )
        .map(|entry| entry.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(files, vec!["a.mp3", "b.flac", "c.ogg", "z.mp3"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "PermissionDenied");
        assert_eq!(errors[0].path.as_deref(), Some(locked.as_path()));
    }
}
