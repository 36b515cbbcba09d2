//! Virtual clock.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use fleetbus_core::Environment;
use tokio::sync::watch;

/// Environment whose clock only moves when told to.
///
/// Clones share one clock. `sleep` never moves it: a sleeper stays pending
/// until some caller [`advance`](Self::advance)s past its deadline.
#[derive(Debug, Clone)]
pub struct SimEnv {
    base: Instant,
    offset: Arc<watch::Sender<Duration>>,
}

impl SimEnv {
    /// Clock starting now at zero offset.
    pub fn new() -> Self {
        let (offset, _) = watch::channel(Duration::ZERO);
        Self { base: Instant::now(), offset: Arc::new(offset) }
    }

    /// Move the clock forward, waking every sleeper whose deadline passed.
    pub fn advance(&self, by: Duration) {
        self.offset.send_modify(|offset| *offset += by);
    }

    /// Virtual time since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.borrow()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let deadline = self.elapsed() + duration;
        let mut clock = self.offset.subscribe();
        async move {
            // Errors only once every clone of the clock is dropped.
            let _ = clock.wait_for(|offset| *offset >= deadline).await;
        }
    }
}
