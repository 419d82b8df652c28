// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::config::model::ProjectConfig;
use crate::config::validate::validate_project;
use crate::errors::{GoforgeError, Result};

/// File name of the project configuration.
pub const CONFIG_FILE_NAME: &str = "goforge.yml";

/// Port assumed when the application config has a `server` section but no
/// usable `port` key.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Application config files the scaffolded project may carry, in lookup order.
const APP_CONFIG_CANDIDATES: &[&str] = &[
    "configs/config.yaml",
    "configs/config.yml",
    "config.yaml",
    "config.yml",
];

/// Walk from `start` up to the filesystem root looking for `goforge.yml`.
///
/// Returns the directory containing it, which is the project root.
pub fn find_project_root(start: impl AsRef<Path>) -> Result<PathBuf> {
    let mut dir = start.as_ref().to_path_buf();
    loop {
        if dir.join(CONFIG_FILE_NAME).is_file() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(GoforgeError::ConfigError(format!(
                "{CONFIG_FILE_NAME} not found in this directory or any parent"
            )));
        }
    }
}

/// Load `goforge.yml` from a given path.
///
/// This only performs YAML deserialization; use [`load_and_validate`] to also
/// check the watch section.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: ProjectConfig = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Load `goforge.yml` from a path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let config = load_from_path(&path)?;
    validate_project(&config)?;
    Ok(config)
}

/// Find the project that contains `start`, then load and validate its config.
///
/// Returns the config together with the project root directory.
pub fn load_project(start: impl AsRef<Path>) -> Result<(ProjectConfig, PathBuf)> {
    let root = find_project_root(start)?;
    let config = load_and_validate(root.join(CONFIG_FILE_NAME))?;
    debug!(root = ?root, project = %config.project_name, "loaded project config");
    Ok((config, root))
}

/// Look for a server port in the application config next to `goforge.yml`.
///
/// - `server.port` as a number or numeric string wins.
/// - A `server` section without a usable port means [`DEFAULT_SERVER_PORT`].
/// - No application config, or one without `server`, means `None`.
pub fn detect_server_port(root: impl AsRef<Path>) -> Option<u16> {
    let root = root.as_ref();

    for candidate in APP_CONFIG_CANDIDATES {
        let path = root.join(candidate);
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };

        let doc: Value = match serde_yaml::from_str(&contents) {
            Ok(v) => v,
            Err(err) => {
                debug!(path = ?path, error = %err, "application config is not valid YAML");
                continue;
            }
        };

        let Some(server) = doc.get("server") else {
            return None;
        };

        let port = match server.get("port") {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
            _ => None,
        };

        return Some(port.filter(|p| *p != 0).unwrap_or(DEFAULT_SERVER_PORT));
    }

    None
}
