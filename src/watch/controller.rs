// src/watch/controller.rs

//! The watch session: file events in, safe restarts out.
//!
//! ```text
//! notify callback ──mpsc──▶ event loop ──PathMatcher──▶ cooldown gate
//!                                                          │
//!                                            Debouncer::debounce
//!                                                          │
//!                                                          ▼
//!                       RestartSequence: stop ─▶ reclaim port ─▶ settle ─▶ start
//! ```
//!
//! The supervisor sits behind an async mutex which a restart sequence holds
//! from stop to start. That gives the stop-before-start ordering, and makes
//! [`WatchController::stop`] wait for an in-flight restart before the final
//! close.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::errors::{GoforgeError, Result};
use crate::exec::supervisor::{ProcessSupervisor, SupervisorEvent, SupervisorOptions};
use crate::port::PortReclaimer;
use crate::types::{ChangeKind, SupervisorState};
use crate::watch::debounce::Debouncer;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::PathMatcher;
use crate::watch::settings::WatchConfiguration;
use crate::watch::walker::WatchedDirectorySet;

/// Stop, reclaim the port, settle, start.
///
/// One instance is shared by every debounced restart of a session.
pub struct RestartSequence {
    supervisor: Arc<Mutex<ProcessSupervisor>>,
    reclaimer: Arc<PortReclaimer>,
    port: Option<u16>,
    reclaim_timeout: Duration,
    settle_delay: Duration,
    cooldown: Duration,
    /// End of the last completed restart.
    last_restart: std::sync::Mutex<Option<Instant>>,
    restarts: AtomicU64,
    fatal_tx: mpsc::UnboundedSender<GoforgeError>,
}

impl RestartSequence {
    pub async fn run(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.state() == SupervisorState::Closed {
            debug!("supervisor closed; restart skipped");
            return;
        }
        // A restart queued behind the previous one is still subject to the
        // cooldown measured from that one's end.
        if let Some(remaining) = self.cooldown_remaining() {
            debug!(?remaining, "queued restart within cooldown; skipped");
            return;
        }

        info!("restarting");

        if let Err(err) = supervisor.stop().await {
            self.report(err);
            return;
        }

        if let Some(port) = self.port {
            if let Err(err) = self.reclaimer.ensure_available(port, self.reclaim_timeout).await {
                warn!(port, error = %err, "starting anyway");
            }
        }

        sleep(self.settle_delay).await;

        match supervisor.start() {
            Ok(pid) => info!(pid, "restarted"),
            Err(err) => self.report(err),
        }

        self.restarts.fetch_add(1, Ordering::SeqCst);
        *self
            .last_restart
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Time left before another restart may be scheduled.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let last = (*self
            .last_restart
            .lock()
            .unwrap_or_else(PoisonError::into_inner))?;
        self.cooldown.checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    pub fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    fn report(&self, err: GoforgeError) {
        if err.is_session_fatal() {
            error!(error = %err, "watch session cannot continue");
            let _ = self.fatal_tx.send(err);
        } else {
            error!(error = %err, "restart failed; waiting for the next change");
        }
    }
}

/// Owns one watch session.
pub struct WatchController {
    config: Arc<WatchConfiguration>,
    matcher: Arc<PathMatcher>,
    supervisor: Arc<Mutex<ProcessSupervisor>>,
    debouncer: Arc<Debouncer>,
    sequence: Arc<RestartSequence>,
    watched: WatchedDirectorySet,
    watcher: Option<RecommendedWatcher>,
    event_task: Option<JoinHandle<()>>,
    supervisor_task: Option<JoinHandle<()>>,
    supervisor_events: Option<mpsc::UnboundedReceiver<SupervisorEvent>>,
    unexpected_exits: Arc<AtomicU64>,
    fatal_rx: mpsc::UnboundedReceiver<GoforgeError>,
    started: bool,
    stopped: bool,
}

impl std::fmt::Debug for WatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchController")
            .field("root", &self.config.root)
            .field("command", &self.config.command)
            .field("watched", &self.watched.len())
            .field("started", &self.started)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl WatchController {
    /// Build a controller using the port lookup available on this machine.
    pub fn new(config: WatchConfiguration) -> Result<Self> {
        Self::with_reclaimer(config, PortReclaimer::detect())
    }

    pub fn with_reclaimer(mut config: WatchConfiguration, reclaimer: PortReclaimer) -> Result<Self> {
        // notify reports canonical paths.
        if let Ok(root) = config.root.canonicalize() {
            config.root = root;
        }

        let matcher = PathMatcher::new(&config.root, &config.include, &config.exclude)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let options = SupervisorOptions::new(&config.command, &config.root)
            .with_grace_period(config.grace_period)
            .with_verbose(config.verbose);
        let supervisor = Arc::new(Mutex::new(
            ProcessSupervisor::new(options)?.with_event_sink(events_tx),
        ));

        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let sequence = Arc::new(RestartSequence {
            supervisor: Arc::clone(&supervisor),
            reclaimer: Arc::new(reclaimer),
            port: config.port,
            reclaim_timeout: config.reclaim_timeout,
            settle_delay: config.settle_delay,
            cooldown: config.cooldown,
            last_restart: std::sync::Mutex::new(None),
            restarts: AtomicU64::new(0),
            fatal_tx,
        });

        Ok(Self {
            debouncer: Arc::new(Debouncer::new(config.debounce)),
            config: Arc::new(config),
            matcher: Arc::new(matcher),
            supervisor,
            sequence,
            watched: WatchedDirectorySet::default(),
            watcher: None,
            event_task: None,
            supervisor_task: None,
            supervisor_events: Some(events_rx),
            unexpected_exits: Arc::new(AtomicU64::new(0)),
            fatal_rx,
            started: false,
            stopped: false,
        })
    }

    pub fn config(&self) -> &WatchConfiguration {
        &self.config
    }

    /// Subscribe to the project tree and start the child once.
    ///
    /// Any failure while setting up the subscription aborts the whole start;
    /// no partial session is left behind. A child that fails to spawn is
    /// only logged: the next relevant change tries again.
    pub async fn start(&mut self) -> Result<()> {
        if self.stopped {
            return Err(GoforgeError::SupervisorClosed);
        }
        if self.started {
            return Ok(());
        }

        let watched = WatchedDirectorySet::collect(&self.matcher)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // The receiver is gone once the session stops.
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;
        for dir in watched.iter() {
            watcher.watch(dir, RecursiveMode::NonRecursive).map_err(|err| {
                GoforgeError::WatchSubscription(format!("watching {:?}: {}", dir, err))
            })?;
        }

        info!(
            root = ?self.config.root,
            directories = watched.len(),
            command = %self.config.command,
            "watching for changes"
        );
        if let Some(port) = self.config.port {
            debug!(port, reclaimer = ?self.sequence.reclaimer, "port reclamation enabled");
        }

        {
            let mut supervisor = self.supervisor.lock().await;
            if let Err(err) = supervisor.start() {
                if err.is_session_fatal() {
                    return Err(err);
                }
                error!(error = %err, "initial start failed; waiting for the next change");
            }
        }

        if let Some(events) = self.supervisor_events.take() {
            self.supervisor_task = Some(tokio::spawn(log_supervisor_events(
                events,
                Arc::clone(&self.unexpected_exits),
            )));
        }
        self.event_task = Some(tokio::spawn(run_event_loop(
            event_rx,
            Arc::clone(&self.matcher),
            Arc::clone(&self.debouncer),
            Arc::clone(&self.sequence),
        )));

        self.watched = watched;
        self.watcher = Some(watcher);
        self.started = true;
        Ok(())
    }

    /// End the session. Safe to call more than once.
    ///
    /// Waits for an in-flight restart to finish, then closes the supervisor.
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        drop(self.watcher.take());
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        if self.debouncer.cancel() {
            debug!("pending restart cancelled");
        }

        let result = self.supervisor.lock().await.close().await;

        if let Some(task) = self.supervisor_task.take() {
            task.abort();
        }

        info!(restarts = self.restart_count(), "watch session stopped");
        result
    }

    /// Resolves with the first error that ended the session.
    pub async fn session_failed(&mut self) -> GoforgeError {
        match self.fatal_rx.recv().await {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// Completed restart sequences, successful or not.
    pub fn restart_count(&self) -> u64 {
        self.sequence.restart_count()
    }

    /// Times the child exited without being asked to.
    pub fn unexpected_exit_count(&self) -> u64 {
        self.unexpected_exits.load(Ordering::SeqCst)
    }

    /// Pid of the live child. Waits for an in-flight restart.
    pub async fn child_pid(&self) -> Option<u32> {
        let supervisor = self.supervisor.lock().await;
        if supervisor.is_alive() {
            supervisor.pid()
        } else {
            None
        }
    }

    pub async fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.lock().await.state()
    }

    pub fn watched_directories(&self) -> &WatchedDirectorySet {
        &self.watched
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }
}

async fn run_event_loop(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    matcher: Arc<PathMatcher>,
    debouncer: Arc<Debouncer>,
    sequence: Arc<RestartSequence>,
) {
    while let Some(res) = events.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "file watch error");
                continue;
            }
        };

        let kind = ChangeKind::from(&event.kind);
        let Some(path) = event.paths.iter().find(|p| matcher.is_relevant(p, kind)) else {
            trace!(?event, "ignored event");
            continue;
        };
        let rel = relative_str(matcher.root(), path).unwrap_or_else(|| path.display().to_string());

        if let Some(remaining) = sequence.cooldown_remaining() {
            debug!(path = %rel, ?remaining, "change during cooldown; ignored");
            continue;
        }

        info!(path = %rel, %kind, "change detected");
        let sequence = Arc::clone(&sequence);
        debouncer.debounce(move || async move { sequence.run().await });
    }
    debug!("watch event loop finished");
}

async fn log_supervisor_events(
    mut events: mpsc::UnboundedReceiver<SupervisorEvent>,
    unexpected_exits: Arc<AtomicU64>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::Started { pid } => debug!(pid, "supervisor: started"),
            SupervisorEvent::Stopped { pid, forced } => {
                debug!(pid, forced, "supervisor: stopped")
            }
            SupervisorEvent::UnexpectedExit { pid, .. } => {
                unexpected_exits.fetch_add(1, Ordering::SeqCst);
                info!(pid, "no process running; save a file to restart");
            }
        }
    }
}
