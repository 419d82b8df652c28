// src/watch/walker.rs

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{GoforgeError, Result};
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::PathMatcher;

/// Directories subscribed to filesystem notifications.
///
/// Built once, at start time, by walking the project root. Excluded
/// directories are pruned before descending, so nothing below `vendor/`
/// (for example) is ever visited, let alone watched.
#[derive(Debug, Clone, Default)]
pub struct WatchedDirectorySet {
    dirs: BTreeSet<PathBuf>,
}

impl WatchedDirectorySet {
    /// Walk `matcher.root()` and collect every non-excluded directory.
    ///
    /// Symlinked directories are not followed. A directory that disappears
    /// mid-walk is skipped; any other IO error fails the walk.
    pub fn collect(matcher: &PathMatcher) -> Result<Self> {
        let root = matcher.root();
        if !root.is_dir() {
            return Err(GoforgeError::WatchSubscription(format!(
                "project root {:?} is not a directory",
                root
            )));
        }

        let mut dirs = BTreeSet::new();
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound && dir != root => {
                    debug!(dir = ?dir, "directory vanished during walk");
                    continue;
                }
                Err(err) => return Err(walk_error(&dir, err)),
            };

            for entry in entries {
                let entry = entry.map_err(|e| walk_error(&dir, e))?;
                let file_type = entry.file_type().map_err(|e| walk_error(&dir, e))?;
                if !file_type.is_dir() {
                    continue;
                }

                let path = entry.path();
                let Some(rel) = relative_str(root, &path) else {
                    continue;
                };
                if matcher.is_dir_excluded(&rel) {
                    debug!(dir = %rel, "ignoring directory");
                    continue;
                }
                stack.push(path);
            }

            dirs.insert(dir);
        }

        Ok(Self { dirs })
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }
}

fn walk_error(dir: &Path, err: io::Error) -> GoforgeError {
    GoforgeError::WatchSubscription(format!("walking {:?}: {}", dir, err))
}
