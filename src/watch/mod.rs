// src/watch/mod.rs

//! File watching and restart control.
//!
//! This module is responsible for:
//! - Compiling include / exclude glob patterns into a [`PathMatcher`].
//! - Walking the project once to build the [`WatchedDirectorySet`], never
//!   descending into excluded directories.
//! - Coalescing bursts of relevant changes with a [`Debouncer`].
//! - Wiring all of it, plus the process supervisor and port reclaimer, into
//!   a [`WatchController`].
//!
//! It does **not** know anything about the supervised program; a changed
//! path is only ever "relevant" or "not relevant".

pub mod controller;
pub mod debounce;
pub mod path_utils;
pub mod patterns;
pub mod settings;
pub mod walker;

pub use controller::WatchController;
pub use debounce::Debouncer;
pub use patterns::{is_editor_artifact, PathMatcher};
pub use settings::{WatchConfiguration, DEFAULT_EXCLUDE, DEFAULT_INCLUDE};
pub use walker::WatchedDirectorySet;
