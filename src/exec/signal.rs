// src/exec/signal.rs

//! Platform-specific process termination.
//!
//! Unix delivers SIGTERM / SIGKILL with `nix`, to a single pid or to a whole
//! process group. Windows has no signals for console-less children, so both
//! paths go through `taskkill` (`/T` for the tree, `/F` to force).
//!
//! All functions return `Ok(false)` when the target no longer exists.

use std::io;

/// How hard to ask a process to go away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM / `taskkill` without `/F`.
    Graceful,
    /// SIGKILL / `taskkill /F`.
    Forceful,
}

#[cfg(unix)]
mod imp {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    use super::Termination;

    fn to_signal(how: Termination) -> Signal {
        match how {
            Termination::Graceful => Signal::SIGTERM,
            Termination::Forceful => Signal::SIGKILL,
        }
    }

    /// pid 0 and 1 address our own group and init; never signal those.
    fn to_pid(pid: u32) -> io::Result<Pid> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 1 => Ok(Pid::from_raw(raw)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal pid {pid}"),
            )),
        }
    }

    fn deliver(result: nix::Result<()>) -> io::Result<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    pub async fn signal_group(pgid: u32, how: Termination) -> io::Result<bool> {
        signal_group_now(pgid, how)
    }

    pub async fn signal_process(pid: u32, how: Termination) -> io::Result<bool> {
        deliver(kill(to_pid(pid)?, to_signal(how)))
    }

    pub fn signal_group_now(pgid: u32, how: Termination) -> io::Result<bool> {
        deliver(killpg(to_pid(pgid)?, to_signal(how)))
    }

    pub fn group_exists(pgid: u32) -> io::Result<bool> {
        match killpg(to_pid(pgid)?, None::<Signal>) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::io;
    use std::process::Stdio;

    use tokio::process::Command;

    use super::Termination;

    /// `taskkill` exits with 128 when the pid does not exist.
    const TASKKILL_NOT_FOUND: i32 = 128;

    fn taskkill_args(pid: u32, tree: bool, how: Termination) -> Vec<String> {
        let mut args = vec!["/PID".to_string(), pid.to_string()];
        if tree {
            args.push("/T".to_string());
        }
        if how == Termination::Forceful {
            args.push("/F".to_string());
        }
        args
    }

    async fn taskkill(pid: u32, tree: bool, how: Termination) -> io::Result<bool> {
        let output = Command::new("taskkill")
            .args(taskkill_args(pid, tree, how))
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            return Ok(true);
        }
        if output.status.code() == Some(TASKKILL_NOT_FOUND) {
            return Ok(false);
        }
        Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }

    pub async fn signal_group(pgid: u32, how: Termination) -> io::Result<bool> {
        taskkill(pgid, true, how).await
    }

    pub async fn signal_process(pid: u32, how: Termination) -> io::Result<bool> {
        taskkill(pid, false, how).await
    }

    pub fn signal_group_now(pgid: u32, how: Termination) -> io::Result<bool> {
        std::process::Command::new("taskkill")
            .args(taskkill_args(pgid, true, how))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| true)
    }

    /// `taskkill /T` takes the tree down with the leader, so there is
    /// nothing left to look for once the leader has exited.
    pub fn group_exists(_pgid: u32) -> io::Result<bool> {
        Ok(false)
    }
}

/// Signal the process group led by `pgid` (the whole tree on Windows).
pub async fn signal_group(pgid: u32, how: Termination) -> io::Result<bool> {
    imp::signal_group(pgid, how).await
}

/// Signal a single process.
pub async fn signal_process(pid: u32, how: Termination) -> io::Result<bool> {
    imp::signal_process(pid, how).await
}

/// Whether any process is left in the group led by `pgid`.
///
/// Exited but unreaped members still count.
pub fn group_exists(pgid: u32) -> io::Result<bool> {
    imp::group_exists(pgid)
}

/// Synchronous group signal for use from `Drop`.
pub fn signal_group_now(pgid: u32, how: Termination) -> io::Result<bool> {
    imp::signal_group_now(pgid, how)
}
