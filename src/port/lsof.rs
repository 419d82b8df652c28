// src/port/lsof.rs

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::trace;

use crate::port::lookup::{LookupFuture, PortOwnerLookup};

/// Owner lookup through `lsof -t`.
#[derive(Debug, Clone)]
pub struct LsofLookup {
    program: PathBuf,
}

impl LsofLookup {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `lsof` resolved from `PATH`, if installed.
    pub fn from_path() -> Option<Self> {
        which::which("lsof").ok().map(Self::new)
    }
}

impl PortOwnerLookup for LsofLookup {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn find_owners(&self, port: u16) -> LookupFuture<'_, Vec<u32>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(["-n", "-P", "-t"])
                .arg(format!("-iTCP:{port}"))
                .arg("-sTCP:LISTEN")
                .stdin(Stdio::null())
                .output()
                .await?;

            // lsof exits 1 both when nothing matches and on harmless
            // warnings, so only stdout is trusted.
            let stdout = String::from_utf8_lossy(&output.stdout);
            trace!(port, output = %stdout.trim(), "lsof output");
            Ok(parse_lsof_pids(&stdout))
        })
    }
}

/// Parse `lsof -t` output: one pid per line.
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}
