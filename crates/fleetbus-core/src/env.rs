//! Environment abstraction.
//!
//! State machines never read the clock themselves; callers pass `now`. The
//! runtime gets `now` from an [`Environment`], which production backs with the
//! system clock and the simulation harness backs with a virtual clock that
//! tests advance by hand.

use std::{
    future::Future,
    time::{Duration, Instant},
};

/// Source of time for the runtime.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Instant;

    /// Wait until `now()` has moved `duration` past the call.
    ///
    /// Must not move the clock itself: the runtime sleeps whenever the bus is
    /// idle, and a sleep that advanced time would let an idle loop run the
    /// clock away.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
