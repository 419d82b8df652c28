// src/port/netstat.rs

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::trace;

use crate::errors::GoforgeError;
use crate::port::lookup::{LookupFuture, PortOwnerLookup};

/// Owner lookup through the `netstat -ano` connection table (Windows).
#[derive(Debug, Clone)]
pub struct NetstatLookup {
    program: PathBuf,
}

impl NetstatLookup {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_path() -> Option<Self> {
        which::which("netstat").ok().map(Self::new)
    }
}

impl PortOwnerLookup for NetstatLookup {
    fn name(&self) -> &'static str {
        "netstat"
    }

    fn find_owners(&self, port: u16) -> LookupFuture<'_, Vec<u32>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(["-ano", "-p", "TCP"])
                .stdin(Stdio::null())
                .output()
                .await?;

            if !output.status.success() {
                return Err(GoforgeError::Other(anyhow::anyhow!(
                    "netstat exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            let table = String::from_utf8_lossy(&output.stdout);
            let pids = parse_netstat_pids(&table, port);
            trace!(port, ?pids, "netstat owners");
            Ok(pids)
        })
    }
}

/// Pids of the `LISTENING` TCP rows whose local address ends in `:port`.
///
/// Rows look like `TCP    0.0.0.0:8080    0.0.0.0:0    LISTENING    4242`.
pub fn parse_netstat_pids(table: &str, port: u16) -> Vec<u32> {
    let mut pids: Vec<u32> = table
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let [proto, local, _foreign, state, pid] = cols.as_slice() else {
                return None;
            };
            if !proto.eq_ignore_ascii_case("tcp") || !state.eq_ignore_ascii_case("listening") {
                return None;
            }
            let (_, local_port) = local.rsplit_once(':')?;
            if local_port.parse::<u16>().ok()? != port {
                return None;
            }
            pid.parse::<u32>().ok().filter(|pid| *pid != 0)
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}
