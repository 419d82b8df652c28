// src/config/validate.rs

use globset::Glob;

use crate::config::duration::parse_duration;
use crate::config::model::{ProjectConfig, WatchSection};
use crate::errors::{GoforgeError, Result};

/// Check the parts of `goforge.yml` the supervisor depends on.
pub fn validate_project(cfg: &ProjectConfig) -> Result<()> {
    validate_scripts(cfg)?;
    validate_watch_section(&cfg.watch)?;
    Ok(())
}

fn validate_scripts(cfg: &ProjectConfig) -> Result<()> {
    for (name, command) in cfg.scripts.iter() {
        if command.trim().is_empty() {
            return Err(GoforgeError::ConfigError(format!(
                "script '{name}' has an empty command"
            )));
        }
    }
    Ok(())
}

fn validate_watch_section(watch: &WatchSection) -> Result<()> {
    for (key, patterns) in [("include", &watch.include), ("exclude", &watch.exclude)] {
        let Some(patterns) = patterns else {
            continue;
        };
        if key == "include" && patterns.is_empty() {
            return Err(GoforgeError::ConfigError(
                "watch.include must list at least one pattern".to_string(),
            ));
        }
        for pat in patterns {
            Glob::new(pat).map_err(|e| {
                GoforgeError::ConfigError(format!("watch.{key}: invalid glob '{pat}': {e}"))
            })?;
        }
    }

    if watch.port == Some(0) {
        return Err(GoforgeError::ConfigError(
            "watch.port must be between 1 and 65535".to_string(),
        ));
    }

    for (key, value) in [
        ("debounce", &watch.debounce),
        ("cooldown", &watch.cooldown),
        ("grace_period", &watch.grace_period),
    ] {
        if let Some(raw) = value {
            parse_duration(raw)
                .map_err(|e| GoforgeError::ConfigError(format!("watch.{key}: {e}")))?;
        }
    }

    Ok(())
}

impl ProjectConfig {
    /// Resolve a script by name.
    pub fn script(&self, name: &str) -> Result<&str> {
        self.scripts
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| GoforgeError::ScriptNotFound {
                name: name.to_string(),
                available: self.format_available_scripts(),
            })
    }
}
