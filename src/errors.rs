// src/errors.rs

//! Crate-wide error type.
//!
//! Errors fall into two groups:
//! - per-restart errors (`SpawnError`, `PortUnavailable`, `UnexpectedExit`)
//!   which are logged and contained inside a single restart sequence;
//! - session errors (`ReapTimeout`, `WatchSubscription`, `SupervisorClosed`)
//!   which end the watch session and surface to the CLI.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GoforgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("script '{name}' not found in goforge.yml\n\nAvailable scripts:\n{available}")]
    ScriptNotFound { name: String, available: String },

    #[error("failed to spawn `{command}`: {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process group {pid} could not be reaped: {reason}")]
    ReapTimeout { pid: u32, reason: String },

    #[error("port {port} is still in use after {waited:?}")]
    PortUnavailable { port: u16, waited: Duration },

    #[error("failed to set up file watching: {0}")]
    WatchSubscription(String),

    #[error("process {pid} exited without a stop request ({status})")]
    UnexpectedExit { pid: u32, status: String },

    #[error("a supervised process is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("process supervisor has been closed")]
    SupervisorClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GoforgeError {
    /// Whether this error invalidates the whole watch session.
    ///
    /// Once reaping could not be confirmed the supervisor can no longer
    /// guarantee the at-most-one-child invariant, so the session ends.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            GoforgeError::ReapTimeout { .. }
                | GoforgeError::WatchSubscription(_)
                | GoforgeError::SupervisorClosed
        )
    }
}

impl From<notify::Error> for GoforgeError {
    fn from(err: notify::Error) -> Self {
        GoforgeError::WatchSubscription(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GoforgeError>;
