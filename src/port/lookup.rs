// src/port/lookup.rs

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::exec::signal::{signal_process, Termination};

/// Boxed future returned by [`PortOwnerLookup`] methods.
pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Finds and terminates the processes listening on a TCP port.
///
/// Production code uses [`LsofLookup`](super::LsofLookup) or
/// [`NetstatLookup`](super::NetstatLookup); tests can plug in a fake that
/// releases an in-process listener instead of killing anything.
pub trait PortOwnerLookup: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Pids of the processes listening on `port`. Empty when nobody is.
    fn find_owners(&self, port: u16) -> LookupFuture<'_, Vec<u32>>;

    /// Ask `pid` to go away. `Ok(false)` means it was already gone.
    fn terminate(&self, pid: u32, how: Termination) -> LookupFuture<'_, bool> {
        Box::pin(async move { Ok(signal_process(pid, how).await?) })
    }
}

/// Lookup used when no owner-discovery tool is available.
///
/// Owners are never found, so the reclaimer only waits for the port to be
/// released on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeOnlyLookup;

impl PortOwnerLookup for ProbeOnlyLookup {
    fn name(&self) -> &'static str {
        "probe-only"
    }

    fn find_owners(&self, _port: u16) -> LookupFuture<'_, Vec<u32>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn terminate(&self, _pid: u32, _how: Termination) -> LookupFuture<'_, bool> {
        Box::pin(async { Ok(false) })
    }
}
