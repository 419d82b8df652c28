#![allow(dead_code, unused_imports)]

pub use goforge_test_utils::{init_tracing, wait_until, with_timeout, with_timeout_of, ProjectFixture};

use std::time::Duration;

/// Pause between port reclaim and start used by restart tests.
pub const FAST_SETTLE: Duration = Duration::from_millis(50);
