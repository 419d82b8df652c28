// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again. For deleted files the second
///   attempt can't succeed, which is fine: deletes never trigger a restart.
///
/// Returns `None` if the path is not under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(normalize(rel));
    }

    // macOS reports /private/var/... for paths registered as /var/...
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(normalize(rel));
        }
    }

    None
}

fn normalize(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Every ancestor directory of a relative file path, shortest first.
///
/// `"a/b/c.go"` yields `["a", "a/b"]`.
pub fn ancestor_dirs(rel_path: &str) -> Vec<&str> {
    rel_path
        .match_indices('/')
        .map(|(idx, _)| &rel_path[..idx])
        .filter(|dir| !dir.is_empty())
        .collect()
}
