// src/exec/supervisor.rs

//! Lifecycle of the single supervised child process.
//!
//! The child is spawned through the platform shell in its own process group.
//! Three background tasks belong to each incarnation:
//! - two output drains (stdout / stderr),
//! - an exit monitor that owns the `Child`, reaps it and publishes the exit
//!   outcome on a `watch` channel.
//!
//! `stop` signals the whole group, waits on that channel, escalates to a
//! forced kill after the grace period, and joins the background tasks before
//! returning, so nothing outlives the incarnation it belongs to.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::errors::{GoforgeError, Result};
use crate::exec::output::{spawn_output_drain, OutputClassifier, StreamKind};
use crate::exec::shell::{isolate_process_group, shell_command};
use crate::exec::signal::{group_exists, signal_group, signal_group_now, Termination};
use crate::types::SupervisorState;

/// How long a forced kill may take before reaping is declared failed.
const DEFAULT_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Output drains get this long to hit EOF after the child is reaped.
/// Detached grandchildren can keep a pipe open forever, so the drain is
/// aborted afterwards.
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Bound on joining the exit monitor. It only runs out when the leader
/// could not be reaped.
const MONITOR_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval while waiting for a process group to empty.
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long SIGKILLed group members get to disappear before `stop` returns.
const FORCED_GROUP_SETTLE: Duration = Duration::from_millis(100);

/// How the child ended, as observed by the exit monitor.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    Exited(ExitStatus),
    WaitFailed(String),
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(status) => write!(f, "{status}"),
            ExitOutcome::WaitFailed(err) => write!(f, "wait failed: {err}"),
        }
    }
}

/// Notifications emitted by the supervisor for whoever is listening.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Started { pid: u32 },
    Stopped { pid: u32, forced: bool },
    /// The child exited while nobody asked it to stop.
    UnexpectedExit { pid: u32, outcome: ExitOutcome },
}

/// Static inputs of a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub command: String,
    pub working_dir: PathBuf,
    pub grace_period: Duration,
    pub reap_timeout: Duration,
    pub verbose: bool,
}

impl SupervisorOptions {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            grace_period: crate::watch::settings::DEFAULT_GRACE_PERIOD,
            reap_timeout: DEFAULT_REAP_TIMEOUT,
            verbose: false,
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_reap_timeout(mut self, reap_timeout: Duration) -> Self {
        self.reap_timeout = reap_timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// One live incarnation of the child.
struct SupervisedProcess {
    /// Also the process-group id.
    pid: u32,
    started_at: Instant,
    stop_requested: Arc<AtomicBool>,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
    /// Asks the monitor to kill the leader directly.
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
    drains: Vec<JoinHandle<()>>,
}

impl SupervisedProcess {
    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Wait up to `limit` for the monitor to report the exit.
    async fn wait_exit(&mut self, limit: Duration) -> bool {
        match timeout(limit, self.exit_rx.wait_for(Option::is_some)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => {
                // The monitor is gone without reporting; the child was dropped
                // with kill_on_drop and Tokio reaps it in the background.
                warn!(pid = self.pid, "exit monitor ended without reporting an exit status");
                true
            }
            Err(_) => false,
        }
    }

    async fn join_background(self) {
        let pid = self.pid;
        for drain in self.drains {
            if !join_bounded(drain, DRAIN_JOIN_TIMEOUT).await {
                debug!(pid, "output still open after exit; drain aborted");
            }
        }
        if !join_bounded(self.monitor, MONITOR_JOIN_TIMEOUT).await {
            warn!(pid, "exit monitor still waiting on the child; abandoned");
        }
    }
}

/// Join `task`, aborting it if it has not finished within `limit`.
///
/// Returns false when the task had to be aborted.
async fn join_bounded(mut task: JoinHandle<()>, limit: Duration) -> bool {
    match timeout(limit, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            if !err.is_cancelled() {
                warn!(error = %err, "background task failed");
            }
            true
        }
        Err(_) => {
            task.abort();
            false
        }
    }
}

/// Poll until no process is left in group `pgid`, for at most `limit`.
///
/// An error from the lookup counts as gone; there is nothing more to act on.
async fn wait_group_gone(pgid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        match group_exists(pgid) {
            Ok(false) => return true,
            Ok(true) => {}
            Err(err) => {
                debug!(pgid, error = %err, "process group lookup failed");
                return true;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(GROUP_POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Owns the lifecycle of exactly one child process.
///
/// State machine: `Idle -> Running -> Stopping -> Idle`, and `Closed` once
/// [`close`](Self::close) has run or reaping failed.
pub struct ProcessSupervisor {
    options: SupervisorOptions,
    state: SupervisorState,
    child: Option<SupervisedProcess>,
    classifier: Arc<OutputClassifier>,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("command", &self.options.command)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(options: SupervisorOptions) -> Result<Self> {
        Ok(Self {
            options,
            state: SupervisorState::Idle,
            child: None,
            classifier: Arc::new(OutputClassifier::standard()?),
            events: None,
        })
    }

    /// Send lifecycle notifications to `tx`.
    pub fn with_event_sink(mut self, tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Pid of the current incarnation, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.pid)
    }

    /// How long the current incarnation has been running.
    pub fn uptime(&self) -> Option<Duration> {
        self.child.as_ref().map(|c| c.started_at.elapsed())
    }

    /// True while an incarnation exists and has not exited yet.
    pub fn is_alive(&self) -> bool {
        self.child.as_ref().is_some_and(|c| !c.has_exited())
    }

    /// Spawn the command. Only valid from `Idle`.
    ///
    /// Returns the pid of the new child.
    pub fn start(&mut self) -> Result<u32> {
        match self.state {
            SupervisorState::Idle => {}
            SupervisorState::Closed => return Err(GoforgeError::SupervisorClosed),
            SupervisorState::Running | SupervisorState::Stopping => {
                return Err(GoforgeError::AlreadyRunning(self.pid().unwrap_or_default()));
            }
        }

        let mut cmd = shell_command(&self.options.command);
        cmd.current_dir(&self.options.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);

        let spawn_error = |source: std::io::Error| GoforgeError::SpawnError {
            command: self.options.command.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let Some(pid) = child.id() else {
            return Err(spawn_error(std::io::Error::other(
                "child exited before its pid could be read",
            )));
        };

        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_output_drain(
                stdout,
                StreamKind::Stdout,
                pid,
                self.options.verbose,
                Arc::clone(&self.classifier),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_output_drain(
                stderr,
                StreamKind::Stderr,
                pid,
                self.options.verbose,
                Arc::clone(&self.classifier),
            ));
        }

        info!(pid, command = %self.options.command, "process started");
        self.emit(SupervisorEvent::Started { pid });

        let stop_requested = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();

        let monitor = tokio::spawn(monitor_exit(
            child,
            pid,
            kill_rx,
            exit_tx,
            Arc::clone(&stop_requested),
            self.events.clone(),
        ));

        self.child = Some(SupervisedProcess {
            pid,
            started_at: Instant::now(),
            stop_requested,
            exit_rx,
            kill_tx: Some(kill_tx),
            monitor,
            drains,
        });
        self.state = SupervisorState::Running;
        Ok(pid)
    }

    /// Stop the current incarnation and reap it. No-op without one.
    ///
    /// Returns only once the child is confirmed gone. If that cannot be
    /// confirmed the supervisor closes and `ReapTimeout` is returned.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut proc) = self.child.take() else {
            if self.state == SupervisorState::Running {
                self.state = SupervisorState::Idle;
            }
            return Ok(());
        };

        self.state = SupervisorState::Stopping;
        proc.stop_requested.store(true, Ordering::SeqCst);
        let pid = proc.pid;

        let result = self.terminate(&mut proc).await;
        proc.join_background().await;

        match result {
            Ok(forced) => {
                self.state = SupervisorState::Idle;
                info!(pid, forced, "process stopped");
                self.emit(SupervisorEvent::Stopped { pid, forced });
                Ok(())
            }
            Err(err) => {
                self.state = SupervisorState::Closed;
                error!(pid, error = %err, "could not confirm process exit; supervisor closed");
                Err(err)
            }
        }
    }

    /// Stop any child and refuse further starts.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SupervisorState::Closed {
            return Ok(());
        }
        let result = self.stop().await;
        self.state = SupervisorState::Closed;
        result
    }

    /// Graceful signal, bounded wait, forced kill, bounded wait.
    ///
    /// The grace period covers the whole process group, not just the
    /// leader: members that outlive the leader are killed as well.
    /// Returns whether the forced path was needed.
    async fn terminate(&self, proc: &mut SupervisedProcess) -> Result<bool> {
        let pid = proc.pid;
        let grace = self.options.grace_period;
        let grace_deadline = Instant::now() + grace;

        if proc.has_exited() {
            debug!(pid, "process already exited; sweeping its group");
        } else {
            debug!(pid, ?grace, "sending graceful termination to process group");
        }

        let graceful = signal_group(pid, Termination::Graceful).await;
        match graceful {
            Ok(_) => {
                let remaining = grace_deadline.saturating_duration_since(Instant::now());
                if proc.wait_exit(remaining).await {
                    let remaining = grace_deadline.saturating_duration_since(Instant::now());
                    if wait_group_gone(pid, remaining).await {
                        return Ok(false);
                    }
                    warn!(pid, ?grace, "process group members survived the leader; killing");
                } else {
                    warn!(pid, ?grace, "process ignored graceful termination; killing");
                }
            }
            Err(err) => {
                warn!(pid, error = %err, "graceful termination failed; killing");
            }
        }

        let group_kill = signal_group(pid, Termination::Forceful).await;
        if let Err(err) = &group_kill {
            warn!(pid, error = %err, "forced group kill failed; killing leader directly");
        }
        if let Some(kill_tx) = proc.kill_tx.take() {
            let _ = kill_tx.send(());
        }

        if !proc.wait_exit(self.options.reap_timeout).await {
            let reason = match group_kill {
                Ok(_) => format!("no exit within {:?} of a forced kill", self.options.reap_timeout),
                Err(err) => format!("forced kill failed: {err}"),
            };
            return Err(GoforgeError::ReapTimeout { pid, reason });
        }

        // Killed members are reaped by whoever inherited them.
        if !wait_group_gone(pid, FORCED_GROUP_SETTLE).await {
            debug!(pid, "process group still listed after a forced kill");
        }
        Ok(true)
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let Some(proc) = self.child.take() else {
            return;
        };
        // Dropped without stop (e.g. a panicking test): take the whole group
        // down, the monitor's kill_on_drop child handles the leader.
        proc.stop_requested.store(true, Ordering::SeqCst);
        if let Err(err) = signal_group_now(proc.pid, Termination::Forceful) {
            debug!(pid = proc.pid, error = %err, "group kill on drop failed");
        }
        for drain in &proc.drains {
            drain.abort();
        }
    }
}

/// Own the child until it exits, then publish how it ended.
async fn monitor_exit(
    mut child: Child,
    pid: u32,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
    stop_requested: Arc<AtomicBool>,
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
) {
    let waited = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx => {
            if let Err(err) = child.start_kill() {
                debug!(pid, error = %err, "direct kill failed");
            }
            child.wait().await
        }
    };

    let outcome = match waited {
        Ok(status) => ExitOutcome::Exited(status),
        Err(err) => ExitOutcome::WaitFailed(err.to_string()),
    };

    if stop_requested.load(Ordering::SeqCst) {
        debug!(pid, %outcome, "process exited after stop request");
    } else {
        let err = GoforgeError::UnexpectedExit {
            pid,
            status: outcome.to_string(),
        };
        error!(pid, "{err}");
        if let Some(tx) = &events {
            let _ = tx.send(SupervisorEvent::UnexpectedExit {
                pid,
                outcome: outcome.clone(),
            });
        }
    }

    let _ = exit_tx.send(Some(outcome));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stuck_task_is_aborted_after_the_bound() {
        let stuck = tokio::spawn(std::future::pending::<()>());
        let started = Instant::now();

        assert!(!join_bounded(stuck, Duration::from_millis(100)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn finished_task_joins_cleanly() {
        let done = tokio::spawn(async {});
        assert!(join_bounded(done, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn background_join_is_bounded_when_the_monitor_hangs() {
        let (exit_tx, exit_rx) = watch::channel(None);
        let proc = SupervisedProcess {
            pid: 4_000_002,
            started_at: Instant::now(),
            stop_requested: Arc::new(AtomicBool::new(true)),
            exit_rx,
            kill_tx: None,
            // Stands in for a monitor blocked on a child that cannot be reaped.
            monitor: tokio::spawn(async move {
                let _keep = exit_tx;
                std::future::pending::<()>().await
            }),
            drains: Vec::new(),
        };

        let started = Instant::now();
        timeout(Duration::from_secs(3), proc.join_background())
            .await
            .expect("join_background must be bounded");
        assert!(started.elapsed() >= MONITOR_JOIN_TIMEOUT);
    }
}
