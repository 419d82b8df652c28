#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway project directory.
///
/// The directory is removed when the fixture is dropped.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp project dir"),
        }
    }

    /// Fixture with a `goforge.yml` defining a single `dev` script.
    pub fn with_dev_script(command: &str) -> Self {
        Self::new().with_goforge_yml(&format!(
            "project_name: demo\nmodule_path: example.com/demo\nscripts:\n  dev: {command:?}\n"
        ))
    }

    pub fn with_goforge_yml(self, contents: &str) -> Self {
        self.with_file("goforge.yml", contents)
    }

    pub fn with_file(self, rel: &str, contents: &str) -> Self {
        self.write(rel, contents);
        self
    }

    pub fn with_dir(self, rel: &str) -> Self {
        fs::create_dir_all(self.path().join(rel)).expect("Failed to create fixture dir");
        self
    }

    /// Create or overwrite a file, creating parent directories as needed.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture parent dir");
        }
        fs::write(&path, contents).expect("Failed to write fixture file");
        path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Canonical root, as reported by filesystem notifications.
    pub fn canonical_path(&self) -> PathBuf {
        self.path()
            .canonicalize()
            .unwrap_or_else(|_| self.path().to_path_buf())
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}
