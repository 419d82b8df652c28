// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::trace;

use crate::errors::{GoforgeError, Result};
use crate::types::ChangeKind;
use crate::watch::path_utils::{ancestor_dirs, relative_str};

/// Compiled include / exclude patterns for one project root.
///
/// Patterns are relative to the root and use shell-glob semantics: `*` stays
/// within one path component, `**` spans any number of them. Matching is
/// purely lexical; nothing here touches the filesystem except the
/// canonicalize fallback in [`relative_str`].
#[derive(Clone)]
pub struct PathMatcher {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    /// Directory forms of exclude patterns: `vendor/**` contributes `vendor`.
    exclude_dirs: GlobSet,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("root", &self.root)
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.len())
            .finish_non_exhaustive()
    }
}

impl PathMatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self> {
        let dir_patterns: Vec<String> = exclude
            .iter()
            .filter_map(|pat| directory_pattern(pat))
            .collect();

        Ok(Self {
            root: root.into(),
            include: build_globset("include", include)?,
            exclude: build_globset("exclude", exclude)?,
            exclude_dirs: build_globset("exclude", &dir_patterns)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decide whether a change to `path` should restart the child process.
    pub fn is_relevant(&self, path: &Path, kind: ChangeKind) -> bool {
        if !kind.is_restart_worthy() {
            trace!(?path, %kind, "ignoring change kind");
            return false;
        }

        let Some(rel) = relative_str(&self.root, path) else {
            trace!(?path, "path outside project root");
            return false;
        };

        self.is_relevant_rel(&rel)
    }

    /// Same as [`is_relevant`](Self::is_relevant) for an already-relative
    /// path with a restart-worthy change kind.
    pub fn is_relevant_rel(&self, rel: &str) -> bool {
        if rel.is_empty() {
            return false;
        }

        if ancestor_dirs(rel)
            .into_iter()
            .any(|dir| self.is_dir_excluded(dir))
        {
            trace!(rel, "inside an excluded directory");
            return false;
        }

        let file_name = rel.rsplit('/').next().unwrap_or(rel);
        if is_editor_artifact(file_name) {
            trace!(rel, "editor or temp artifact");
            return false;
        }

        if self.exclude.is_match(rel) || self.exclude.is_match(file_name) {
            trace!(rel, "matches an exclude pattern");
            return false;
        }

        self.include.is_match(rel)
    }

    /// Whether a directory (relative to the root) must never be watched or
    /// descended into.
    pub fn is_dir_excluded(&self, rel_dir: &str) -> bool {
        !rel_dir.is_empty() && (self.exclude_dirs.is_match(rel_dir) || self.exclude.is_match(rel_dir))
    }
}

/// Names that editors and tools write next to real sources.
///
/// Dotfiles, `~` backups, swap files, `.tmp` files and emacs `#autosave#`
/// files never trigger a restart regardless of configured patterns.
pub fn is_editor_artifact(file_name: &str) -> bool {
    file_name.starts_with('.')
        || file_name.starts_with('~')
        || file_name.ends_with(".tmp")
        || file_name.ends_with(".swp")
        || file_name.ends_with(".swo")
        || file_name.contains('#')
}

/// `dist/**` -> `dist`, `**/build/**` -> `**/build`; other patterns have no
/// directory form.
fn directory_pattern(pattern: &str) -> Option<String> {
    let dir = pattern.strip_suffix("/**")?;
    if dir.is_empty() || dir == "**" {
        return None;
    }
    Some(dir.to_string())
}

/// Build a GlobSet from simple string patterns.
fn build_globset(kind: &str, patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                GoforgeError::ConfigError(format!("invalid {kind} glob pattern '{pat}': {e}"))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| GoforgeError::ConfigError(format!("building {kind} globset: {e}")))
}
