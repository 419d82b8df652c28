// src/config/mod.rs

//! Project configuration for goforge.
//!
//! Responsibilities:
//! - Define the YAML-backed data model of `goforge.yml` (`model.rs`).
//! - Locate and load the project file, and peek at the application config
//!   for a server port (`loader.rs`).
//! - Validate watch settings and resolve scripts (`validate.rs`).
//! - Parse human duration strings such as `"1500ms"` (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{
    detect_server_port, find_project_root, load_and_validate, load_from_path, load_project,
    CONFIG_FILE_NAME,
};
pub use model::{BuildConfig, ProjectConfig, WatchSection};
pub use validate::validate_project;
