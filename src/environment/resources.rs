//! Path resolution and resource listing under the base directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Resolve `relative` against `base`.
///
/// A leading `/` is ignored. Returns `None` if the path would step
/// outside `base` (`..`, a prefix, or a root component after trimming).
pub(crate) fn resolve(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }
    Some(base.join(relative))
}

/// Collect every file below `dir`, descending into subdirectories.
///
/// Directories themselves are never part of the result. A missing or
/// unreadable directory contributes nothing.
pub(crate) fn collect_files(dir: &Path, out: &mut BTreeSet<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::trace!(path = %dir.display(), error = %e, "Resource directory not readable");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => collect_files(&path, out),
            Ok(_) => {
                out.insert(path);
            }
            Err(e) => tracing::trace!(path = %path.display(), error = %e, "Skipping entry"),
        }
    }
}
