// tests/supervisor.rs
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, wait_until, with_timeout, ProjectFixture};

use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio::time::Duration;

use goforge::errors::GoforgeError;
use goforge::exec::{ExitOutcome, ProcessSupervisor, SupervisorEvent, SupervisorOptions};
use goforge::types::SupervisorState;

fn supervisor(command: &str, project: &ProjectFixture) -> ProcessSupervisor {
    let options = SupervisorOptions::new(command, project.path())
        .with_grace_period(Duration::from_millis(500))
        .with_reap_timeout(Duration::from_secs(3));
    ProcessSupervisor::new(options).expect("build supervisor")
}

/// True once no process is left in group `pgid`.
fn group_gone(pgid: u32) -> bool {
    matches!(killpg(Pid::from_raw(pgid as i32), None::<Signal>), Err(Errno::ESRCH))
}

#[tokio::test]
async fn start_then_stop_reaps_the_group() {
    init_tracing();
    let project = ProjectFixture::new();
    let mut sup = supervisor("exec sleep 30", &project);

    let pid = sup.start().expect("start");
    assert_eq!(sup.state(), SupervisorState::Running);
    assert_eq!(sup.pid(), Some(pid));
    assert!(sup.is_alive());
    assert!(!group_gone(pid), "child group should exist while running");

    let started = Instant::now();
    with_timeout(sup.stop()).await.expect("stop");
    assert!(started.elapsed() < Duration::from_millis(500), "SIGTERM should be enough");

    assert_eq!(sup.state(), SupervisorState::Idle);
    assert_eq!(sup.pid(), None);
    assert!(!sup.is_alive());
    assert!(group_gone(pid));
}

#[tokio::test]
async fn stop_is_idempotent() {
    init_tracing();
    let project = ProjectFixture::new();
    let mut sup = supervisor("exec sleep 30", &project);

    with_timeout(sup.stop()).await.expect("stop while idle");
    assert_eq!(sup.state(), SupervisorState::Idle);

    sup.start().expect("start");
    with_timeout(sup.stop()).await.expect("first stop");
    with_timeout(sup.stop()).await.expect("second stop");
    assert_eq!(sup.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn second_start_is_rejected() {
    init_tracing();
    let project = ProjectFixture::new();
    let mut sup = supervisor("exec sleep 30", &project);

    let pid = sup.start().expect("start");
    match sup.start() {
        Err(GoforgeError::AlreadyRunning(running)) => assert_eq!(running, pid),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(sup.pid(), Some(pid), "the live child is untouched");

    with_timeout(sup.stop()).await.expect("stop");
}

#[tokio::test]
async fn restart_yields_a_new_child() {
    init_tracing();
    let project = ProjectFixture::new();
    let mut sup = supervisor("exec sleep 30", &project);

    let first = sup.start().expect("first start");
    with_timeout(sup.stop()).await.expect("stop");
    let second = sup.start().expect("second start");

    assert_ne!(first, second);
    assert!(group_gone(first));
    with_timeout(sup.stop()).await.expect("stop");
}

#[tokio::test]
async fn closed_supervisor_refuses_to_start() {
    init_tracing();
    let project = ProjectFixture::new();
    let mut sup = supervisor("exec sleep 30", &project);

    let pid = sup.start().expect("start");
    with_timeout(sup.close()).await.expect("close");
    assert_eq!(sup.state(), SupervisorState::Closed);
    assert!(group_gone(pid));

    assert!(matches!(sup.start(), Err(GoforgeError::SupervisorClosed)));
    with_timeout(sup.close()).await.expect("close again");
}

#[tokio::test]
async fn unexpected_exit_is_reported_not_fatal() {
    init_tracing();
    let project = ProjectFixture::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sup = supervisor("exit 3", &project).with_event_sink(tx);

    let pid = sup.start().expect("start");
    assert!(matches!(rx.recv().await, Some(SupervisorEvent::Started { pid: p }) if p == pid));

    match with_timeout(rx.recv()).await {
        Some(SupervisorEvent::UnexpectedExit { pid: p, outcome }) => {
            assert_eq!(p, pid);
            let ExitOutcome::Exited(status) = outcome else {
                panic!("expected an exit status, got {outcome:?}");
            };
            assert_eq!(status.code(), Some(3));
        }
        other => panic!("expected UnexpectedExit, got {other:?}"),
    }

    assert!(!sup.is_alive());
    with_timeout(sup.stop()).await.expect("stop after exit");
    assert_eq!(sup.state(), SupervisorState::Idle);
    sup.start().expect("a fresh start is still possible");
    with_timeout(sup.stop()).await.expect("stop");
}

#[tokio::test]
async fn requested_stop_is_not_unexpected() {
    init_tracing();
    let project = ProjectFixture::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sup = supervisor("exec sleep 30", &project).with_event_sink(tx);

    let pid = sup.start().expect("start");
    with_timeout(sup.stop()).await.expect("stop");
    drop(sup);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(
        matches!(
            events.as_slice(),
            [SupervisorEvent::Started { .. }, SupervisorEvent::Stopped { pid: p, forced: false }] if *p == pid
        ),
        "unexpected events: {events:?}"
    );
}

#[tokio::test]
async fn child_ignoring_sigterm_is_killed() {
    init_tracing();
    let project = ProjectFixture::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = SupervisorOptions::new("trap '' TERM; while true; do sleep 0.1; done", project.path())
        .with_grace_period(Duration::from_millis(300))
        .with_reap_timeout(Duration::from_secs(3));
    let mut sup = ProcessSupervisor::new(options).expect("build").with_event_sink(tx);

    let pid = sup.start().expect("start");
    // Give the shell time to install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    with_timeout(sup.stop()).await.expect("forced stop");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "grace period was skipped: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "forced kill took {elapsed:?}");
    assert_eq!(sup.state(), SupervisorState::Idle);

    let _started = rx.recv().await;
    match rx.recv().await {
        Some(SupervisorEvent::Stopped { pid: p, forced }) => {
            assert_eq!(p, pid);
            assert!(forced);
        }
        other => panic!("expected Stopped, got {other:?}"),
    }
}

#[tokio::test]
async fn group_member_outliving_the_leader_is_killed() {
    init_tracing();
    let project = ProjectFixture::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = SupervisorOptions::new("(trap '' TERM; exec sleep 30) & exec sleep 30", project.path())
        .with_grace_period(Duration::from_millis(300))
        .with_reap_timeout(Duration::from_secs(3));
    let mut sup = ProcessSupervisor::new(options).expect("build").with_event_sink(tx);

    let pid = sup.start().expect("start");
    tokio::time::sleep(Duration::from_millis(200)).await;

    with_timeout(sup.stop()).await.expect("stop");
    assert_eq!(sup.state(), SupervisorState::Idle);
    assert!(
        wait_until(Duration::from_secs(2), move || async move { group_gone(pid) }).await,
        "a member of the stopped group is still running"
    );

    let _started = rx.recv().await;
    match rx.recv().await {
        Some(SupervisorEvent::Stopped { forced, .. }) => assert!(forced, "survivor needed a forced kill"),
        other => panic!("expected Stopped, got {other:?}"),
    }
}

#[tokio::test]
async fn non_utf8_output_does_not_kill_the_child() {
    init_tracing();
    let project = ProjectFixture::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = SupervisorOptions::new(
        "printf '\\377\\n'; sleep 0.5; echo hi; exec sleep 30",
        project.path(),
    );
    let mut sup = ProcessSupervisor::new(options).expect("build").with_event_sink(tx);

    let pid = sup.start().expect("start");
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(sup.is_alive(), "child died after writing a non UTF-8 line");
    let _started = rx.recv().await;
    assert!(rx.try_recv().is_err(), "no exit may be reported");

    with_timeout(sup.stop()).await.expect("stop");
    assert!(group_gone(pid));
}

#[tokio::test]
async fn spawn_failure_leaves_supervisor_idle() {
    init_tracing();
    let project = ProjectFixture::new();
    let options = SupervisorOptions::new("exec sleep 30", project.path().join("missing"));
    let mut sup = ProcessSupervisor::new(options).expect("build");

    let err = sup.start().unwrap_err();
    assert!(matches!(err, GoforgeError::SpawnError { .. }), "unexpected error: {err:?}");
    assert!(!err.is_session_fatal());
    assert_eq!(sup.state(), SupervisorState::Idle);
    assert_eq!(sup.pid(), None);
}

#[tokio::test]
async fn chatty_child_does_not_block() {
    init_tracing();
    let project = ProjectFixture::new();
    // Far more output than a pipe buffer holds.
    let mut sup = supervisor(
        "i=0; while [ $i -lt 5000 ]; do echo \"line $i of noisy output\"; i=$((i+1)); done; touch done.marker; exec sleep 30",
        &project,
    );

    sup.start().expect("start");
    let marker = project.path().join("done.marker");
    assert!(
        wait_until(Duration::from_secs(10), || {
            let marker = marker.clone();
            async move { marker.exists() }
        })
        .await,
        "child blocked on a full pipe"
    );
    assert!(sup.is_alive());
    with_timeout(sup.stop()).await.expect("stop");
}

#[tokio::test]
async fn dropping_supervisor_kills_the_group() {
    init_tracing();
    let project = ProjectFixture::new();
    let mut sup = supervisor("exec sleep 30", &project);
    let pid = sup.start().expect("start");

    drop(sup);

    assert!(
        wait_until(Duration::from_secs(3), move || async move { group_gone(pid) }).await,
        "child group survived supervisor drop"
    );
}
