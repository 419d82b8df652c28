// tests/port_reclaimer.rs
mod common;
use crate::common::{init_tracing, with_timeout_of};

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::Duration;

use goforge::errors::GoforgeError;
use goforge::exec::Termination;
use goforge::port::{port_is_free, PortReclaimer, ProbeOnlyLookup};
use goforge_test_utils::fake_lookup::FAKE_OWNER_PID;
use goforge_test_utils::FakePortLookup;

fn fast(reclaimer: PortReclaimer) -> PortReclaimer {
    reclaimer
        .with_grace(Duration::from_millis(50))
        .with_retry_interval(Duration::from_millis(20))
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind(("0.0.0.0", 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn loopback_only_listener_makes_port_busy() {
    init_tracing();
    let held = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback");
    let port = held.local_addr().expect("local addr").port();

    assert!(!port_is_free(port));
    drop(held);
    assert!(port_is_free(port));
}

#[test]
fn ipv6_listener_makes_port_busy() {
    init_tracing();
    let Ok(held) = TcpListener::bind(("::", 0)) else {
        eprintln!("no IPv6 on this host; skipping");
        return;
    };
    let port = held.local_addr().expect("local addr").port();

    assert!(!port_is_free(port));
}

#[tokio::test]
async fn free_port_needs_no_lookup() {
    init_tracing();
    let port = unused_port();
    let reclaimer = fast(PortReclaimer::with_lookup(Arc::new(ProbeOnlyLookup)));

    let started = Instant::now();
    reclaimer
        .ensure_available(port, Duration::from_secs(1))
        .await
        .expect("free port must be reported available");
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn owner_is_terminated_gracefully() {
    init_tracing();
    let fake = Arc::new(FakePortLookup::bind().expect("bind fake owner"));
    let port = fake.port();
    assert!(!port_is_free(port));

    let reclaimer = fast(PortReclaimer::with_lookup(fake.clone()));
    with_timeout_of(
        Duration::from_secs(5),
        reclaimer.ensure_available(port, Duration::from_secs(2)),
    )
    .await
    .expect("port should be reclaimed");

    assert!(!fake.is_holding());
    assert_eq!(fake.terminations(), vec![(FAKE_OWNER_PID, Termination::Graceful)]);
}

#[tokio::test]
async fn stubborn_owner_is_killed() {
    init_tracing();
    let fake = Arc::new(FakePortLookup::bind().expect("bind fake owner").ignoring_graceful());
    let port = fake.port();

    let reclaimer = fast(PortReclaimer::with_lookup(fake.clone()));
    with_timeout_of(
        Duration::from_secs(5),
        reclaimer.ensure_available(port, Duration::from_secs(2)),
    )
    .await
    .expect("port should be reclaimed by force");

    assert_eq!(
        fake.terminations(),
        vec![
            (FAKE_OWNER_PID, Termination::Graceful),
            (FAKE_OWNER_PID, Termination::Forceful),
        ]
    );
}

#[tokio::test]
async fn gives_up_after_timeout() {
    init_tracing();
    let held = TcpListener::bind(("0.0.0.0", 0)).expect("bind");
    let port = held.local_addr().expect("local addr").port();
    let reclaimer = fast(PortReclaimer::with_lookup(Arc::new(ProbeOnlyLookup)));

    let started = Instant::now();
    let err = reclaimer
        .ensure_available(port, Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(300));
    match err {
        GoforgeError::PortUnavailable { port: p, waited } => {
            assert_eq!(p, port);
            assert!(waited >= Duration::from_millis(300));
        }
        other => panic!("expected PortUnavailable, got {other:?}"),
    }
    assert!(!GoforgeError::PortUnavailable { port, waited: Duration::ZERO }.is_session_fatal());
    drop(held);
}

/// A real process holding the port is found with `lsof` and terminated.
///
/// Skipped when `lsof` or `python3` is not installed.
#[cfg(unix)]
#[tokio::test]
async fn listener_process_is_reclaimed_with_lsof() {
    use std::process::{Command, Stdio};

    use goforge::port::LsofLookup;

    init_tracing();
    let Some(lsof) = LsofLookup::from_path() else {
        eprintln!("lsof not installed; skipping");
        return;
    };

    let port = unused_port();
    let script = format!(
        "import socket, time\n\
         s = socket.socket()\n\
         s.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1)\n\
         s.bind(('0.0.0.0', {port}))\n\
         s.listen()\n\
         time.sleep(60)\n"
    );
    let Ok(mut child) = Command::new("python3")
        .arg("-c")
        .arg(&script)
        .stdin(Stdio::null())
        .spawn()
    else {
        eprintln!("python3 not installed; skipping");
        return;
    };

    let bound = common::wait_until(Duration::from_secs(5), move || async move { !port_is_free(port) }).await;
    if !bound {
        let _ = child.kill();
        let _ = child.wait();
        panic!("listener never bound port {port}");
    }

    let reclaimer = PortReclaimer::with_lookup(Arc::new(lsof));
    let result = reclaimer.ensure_available(port, Duration::from_secs(8)).await;

    let _ = child.kill();
    let _ = child.wait();

    result.expect("lsof-based reclaim should free the port");
    assert!(port_is_free(port));
}
