//! Production environment.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use fleetbus_core::Environment;

/// Tokio-backed clock.
///
/// Reads time through tokio so a paused test runtime controls it too.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// New system environment
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
