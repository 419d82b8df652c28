// src/exec/shell.rs

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::info;

use crate::errors::{GoforgeError, Result};

/// Build a shell command appropriate for the platform.
pub fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

/// Put the child in its own process group so the whole tree can be
/// signalled at once.
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// Run `script` once in `dir` with inherited stdio (`goforge run`).
///
/// A non-zero exit status is turned into an error naming the script.
pub async fn run_script(dir: &Path, name: &str, script: &str) -> Result<ExitStatus> {
    info!(script = %name, command = %script, "running script");

    let mut cmd = shell_command(script);
    cmd.current_dir(dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let status = cmd
        .spawn()
        .map_err(|source| GoforgeError::SpawnError {
            command: script.to_string(),
            source,
        })?
        .wait()
        .await?;

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        return Err(GoforgeError::Other(anyhow::anyhow!(
            "script '{name}' failed with exit code {code}"
        )));
    }

    Ok(status)
}
