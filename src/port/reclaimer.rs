// src/port/reclaimer.rs

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::errors::{GoforgeError, Result};
use crate::exec::signal::Termination;
use crate::port::lookup::{PortOwnerLookup, ProbeOnlyLookup};
use crate::port::lsof::LsofLookup;
use crate::port::netstat::NetstatLookup;

/// Wait between a graceful termination and the forced one.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Pause between two reclaim attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Addresses a development server commonly binds. On BSD and macOS a
/// wildcard bind succeeds next to a loopback listener, so both are probed.
const PROBE_ADDRS: [IpAddr; 3] = [
    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::UNSPECIFIED),
];

/// Whether `port` can be bound right now on every probed address.
///
/// Only `AddrInUse` counts as busy, so hosts without IPv6 still probe
/// free. Each probe listener is dropped immediately.
pub fn port_is_free(port: u16) -> bool {
    PROBE_ADDRS.iter().all(|ip| match TcpListener::bind(SocketAddr::new(*ip, port)) {
        Ok(_) => true,
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
            trace!(port, %ip, "port busy");
            false
        }
        Err(err) => {
            trace!(port, %ip, error = %err, "probe address unusable; skipped");
            true
        }
    })
}

/// Frees a TCP port held by a stale process.
#[derive(Clone)]
pub struct PortReclaimer {
    lookup: Arc<dyn PortOwnerLookup>,
    grace: Duration,
    retry_interval: Duration,
}

impl std::fmt::Debug for PortReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortReclaimer")
            .field("lookup", &self.lookup.name())
            .field("grace", &self.grace)
            .field("retry_interval", &self.retry_interval)
            .finish()
    }
}

impl PortReclaimer {
    /// Pick the owner lookup available on this machine.
    pub fn detect() -> Self {
        let lookup: Option<Arc<dyn PortOwnerLookup>> = if cfg!(windows) {
            NetstatLookup::from_path().map(|l| Arc::new(l) as Arc<dyn PortOwnerLookup>)
        } else {
            LsofLookup::from_path().map(|l| Arc::new(l) as Arc<dyn PortOwnerLookup>)
        };

        let lookup = lookup.unwrap_or_else(|| {
            warn!("no port owner lookup tool found; stale listeners will not be killed");
            Arc::new(ProbeOnlyLookup)
        });
        debug!(lookup = lookup.name(), "port reclaimer ready");
        Self::with_lookup(lookup)
    }

    pub fn with_lookup(lookup: Arc<dyn PortOwnerLookup>) -> Self {
        Self {
            lookup,
            grace: DEFAULT_GRACE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn lookup_name(&self) -> &'static str {
        self.lookup.name()
    }

    /// Make sure `port` is bindable, killing its owners if needed.
    ///
    /// Gives up with `PortUnavailable` once `timeout` has elapsed.
    pub async fn ensure_available(&self, port: u16, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;

        loop {
            if port_is_free(port) {
                if attempts > 0 {
                    info!(port, attempts, "port reclaimed");
                }
                return Ok(());
            }

            attempts += 1;
            debug!(port, attempt = attempts, "port busy; looking for its owner");
            if let Err(err) = self.reclaim_once(port, deadline).await {
                warn!(port, error = %err, "port reclaim attempt failed");
            }

            if port_is_free(port) {
                info!(port, attempts, "port reclaimed");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(GoforgeError::PortUnavailable {
                    port,
                    waited: started.elapsed(),
                });
            }
            sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    /// One graceful-then-forceful pass over the current owners.
    async fn reclaim_once(&self, port: u16, deadline: Instant) -> Result<()> {
        let owners = self.owners(port).await?;
        if owners.is_empty() {
            debug!(port, lookup = self.lookup.name(), "no owner found for busy port");
            return Ok(());
        }

        for pid in &owners {
            info!(port, pid, "terminating stale port owner");
            if let Err(err) = self.lookup.terminate(*pid, Termination::Graceful).await {
                warn!(port, pid, error = %err, "graceful termination failed");
            }
        }

        sleep(self.grace.min(deadline.saturating_duration_since(Instant::now()))).await;
        if port_is_free(port) {
            return Ok(());
        }

        for pid in self.owners(port).await? {
            warn!(port, pid, "port owner still alive; killing");
            if let Err(err) = self.lookup.terminate(pid, Termination::Forceful).await {
                warn!(port, pid, error = %err, "forced kill failed");
            }
        }
        Ok(())
    }

    /// Owners of `port`, never including this process.
    async fn owners(&self, port: u16) -> Result<Vec<u32>> {
        let own = std::process::id();
        let mut pids = self.lookup.find_owners(port).await?;
        pids.retain(|pid| *pid != own);
        Ok(pids)
    }
}
