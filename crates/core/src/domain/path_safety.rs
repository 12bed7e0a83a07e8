//! Path containment checks for library roots.
//!
//! Containment is decided on resolved, lexically normalised paths, component by
//! component, so `/music/library-archive` is never inside `/music/library`.
//! Nothing here touches the filesystem beyond reading the working directory.

use std::path::{Component, Path, PathBuf};

/// True when `candidate`, once resolved, equals `root` or lies under it.
///
/// Never fails: paths that cannot be resolved are reported as outside.
pub fn is_path_inside_root(candidate: impl AsRef<Path>, root: impl AsRef<Path>) -> bool {
    let (Some(candidate), Some(root)) = (resolve(candidate.as_ref()), resolve(root.as_ref()))
    else {
        return false;
    };

    match candidate.strip_prefix(&root) {
        Ok(relative) => !matches!(
            relative.components().next(),
            Some(Component::ParentDir | Component::RootDir | Component::Prefix(_))
        ),
        Err(_) => false,
    }
}

/// True when `candidate` is inside at least one of `roots`.
pub fn is_path_inside_allowed_roots<P: AsRef<Path>>(candidate: impl AsRef<Path>, roots: &[P]) -> bool {
    let candidate = candidate.as_ref();
    roots
        .iter()
        .any(|root| is_path_inside_root(candidate, root.as_ref()))
}

/// True when a start-scan selection names exactly one folder.
pub fn is_single_folder<P: AsRef<Path>>(selection: &[P]) -> bool {
    selection.len() == 1
}

/// Absolute, `.`/`..`-free, platform-case-folded form of `path`.
fn resolve(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    let absolute = std::path::absolute(path).ok()?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            // `..` at the root stays at the root
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(segment) => normalized.push(segment),
        }
    }

    Some(fold_case(normalized))
}

#[cfg(any(windows, target_os = "macos"))]
fn fold_case(path: PathBuf) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(any(windows, target_os = "macos")))]
fn fold_case(path: PathBuf) -> PathBuf {
    path
}
