// File Entry Domain Model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One regular file discovered by the walker. Ephemeral: consumed by the batch
/// writer, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mtime_ms: i64,
    /// Lower-cased, without the leading dot
    pub extension: String,
}

/// A single entry the walker could not read. Recovered: traversal continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkEntryError {
    /// io::ErrorKind name, or `"walk"` when the OS gave no kind
    pub code: String,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl std::fmt::Display for WalkEntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({}): {}", path.display(), self.code, self.message),
            None => write!(f, "({}): {}", self.code, self.message),
        }
    }
}
