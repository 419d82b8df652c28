// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`supervisor`] owns the single long-running child of a watch session:
//!   spawn in a fresh process group, graceful stop, forced kill, reaping.
//! - [`output`] drains and classifies child stdout / stderr.
//! - [`signal`] wraps the platform-specific ways to terminate processes.
//! - [`shell`] builds platform shell commands and runs one-shot scripts.

pub mod output;
pub mod shell;
pub mod signal;
pub mod supervisor;

pub use output::{LineClass, OutputClassifier, StreamKind};
pub use shell::{run_script, shell_command};
pub use signal::Termination;
pub use supervisor::{ExitOutcome, ProcessSupervisor, SupervisorEvent, SupervisorOptions};
