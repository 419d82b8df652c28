use std::net::TcpListener;
use std::sync::Mutex;

use goforge::exec::Termination;
use goforge::port::lookup::{LookupFuture, PortOwnerLookup};

/// Pid reported for the in-process listener. Never a real process here.
pub const FAKE_OWNER_PID: u32 = 4_000_001;

/// A port owner lookup that "owns" a port with an in-process listener.
///
/// Terminating the fake owner drops the listener, which frees the port.
/// With [`ignoring_graceful`](Self::ignoring_graceful) only a forced kill
/// releases it.
pub struct FakePortLookup {
    port: u16,
    listener: Mutex<Option<TcpListener>>,
    ignore_graceful: bool,
    terminations: Mutex<Vec<(u32, Termination)>>,
}

impl FakePortLookup {
    /// Bind an ephemeral port on all interfaces and pose as its owner.
    pub fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", 0))?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            port,
            listener: Mutex::new(Some(listener)),
            ignore_graceful: false,
            terminations: Mutex::new(Vec::new()),
        })
    }

    pub fn ignoring_graceful(mut self) -> Self {
        self.ignore_graceful = true;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_holding(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    /// Every terminate call received so far.
    pub fn terminations(&self) -> Vec<(u32, Termination)> {
        self.terminations.lock().unwrap().clone()
    }
}

impl PortOwnerLookup for FakePortLookup {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn find_owners(&self, port: u16) -> LookupFuture<'_, Vec<u32>> {
        let owners = if port == self.port && self.is_holding() {
            vec![FAKE_OWNER_PID]
        } else {
            Vec::new()
        };
        Box::pin(async move { Ok(owners) })
    }

    fn terminate(&self, pid: u32, how: Termination) -> LookupFuture<'_, bool> {
        self.terminations.lock().unwrap().push((pid, how));
        let release = how == Termination::Forceful || !self.ignore_graceful;
        let released = if release {
            self.listener.lock().unwrap().take().is_some()
        } else {
            false
        };
        Box::pin(async move { Ok(released) })
    }
}
