// src/watch/settings.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::loader::detect_server_port;
use crate::config::model::ProjectConfig;
use crate::errors::{GoforgeError, Result};

/// Files that restart the server when touched, unless `watch.include` says otherwise.
pub const DEFAULT_INCLUDE: &[&str] = &["**/*.go", "**/*.yml", "**/*.yaml", "**/*.json"];

/// Paths that never restart the server, unless `watch.exclude` says otherwise.
pub const DEFAULT_EXCLUDE: &[&str] = &[
    "**/*_test.go",
    "dist/**",
    "vendor/**",
    ".git/**",
    "node_modules/**",
    "**/*.tmp",
    "**/*.log",
];

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_RECLAIM_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Everything a watch session needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct WatchConfiguration {
    pub root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Port reclaimed between stop and start; `None` skips reclamation.
    pub port: Option<u16>,
    /// Shell command run as the supervised child.
    pub command: String,
    /// Minimum time between the end of one restart and scheduling the next.
    pub cooldown: Duration,
    pub debounce: Duration,
    pub grace_period: Duration,
    pub reclaim_timeout: Duration,
    /// Pause between port reclamation and the next start.
    pub settle_delay: Duration,
    /// Pass child output through raw instead of classifying it.
    pub verbose: bool,
}

impl WatchConfiguration {
    /// Configuration with all defaults for `command` run in `root`.
    pub fn new(root: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            include: to_owned(DEFAULT_INCLUDE),
            exclude: to_owned(DEFAULT_EXCLUDE),
            port: None,
            command: command.into(),
            cooldown: DEFAULT_COOLDOWN,
            debounce: DEFAULT_DEBOUNCE,
            grace_period: DEFAULT_GRACE_PERIOD,
            reclaim_timeout: DEFAULT_RECLAIM_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            verbose: false,
        }
    }

    /// Build the configuration for one script of a loaded project.
    pub fn from_project(
        project: &ProjectConfig,
        root: &Path,
        command: impl Into<String>,
    ) -> Result<Self> {
        let watch = &project.watch;
        let mut cfg = Self::new(root, command);

        if let Some(include) = &watch.include {
            cfg.include = include.clone();
        }
        if let Some(exclude) = &watch.exclude {
            cfg.exclude = exclude.clone();
        }

        cfg.port = watch.port.or_else(|| detect_server_port(root));

        if let Some(d) = parse_opt("debounce", watch.debounce.as_deref())? {
            cfg.debounce = d;
        }
        if let Some(d) = parse_opt("cooldown", watch.cooldown.as_deref())? {
            cfg.cooldown = d;
        }
        if let Some(d) = parse_opt("grace_period", watch.grace_period.as_deref())? {
            cfg.grace_period = d;
        }

        Ok(cfg)
    }

    pub fn with_include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_reclaim_timeout(mut self, timeout: Duration) -> Self {
        self.reclaim_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn parse_opt(key: &str, raw: Option<&str>) -> Result<Option<Duration>> {
    raw.map(|s| {
        parse_duration(s).map_err(|e| GoforgeError::ConfigError(format!("watch.{key}: {e}")))
    })
    .transpose()
}

fn to_owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|s| s.to_string()).collect()
}
