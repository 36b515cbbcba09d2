//! Bus transport abstraction.
//!
//! Production backs this with a SocketCAN socket, tests with an in-memory
//! simulated bus. The core never owns the bus connection: opening, closing
//! and recovering it are the transport owner's job.

use std::io;

use async_trait::async_trait;
use fleetbus_proto::Frame;

/// A shared bus that carries [`Frame`]s in both directions.
///
/// Both methods take `&self` so one task can block in [`recv`](Self::recv)
/// while others send. Implementations must deliver inbound frames in bus
/// order.
#[async_trait]
pub trait BusTransport: Send + Sync + 'static {
    /// Put one frame on the bus.
    async fn send(&self, frame: Frame) -> io::Result<()>;

    /// Wait for the next frame from the bus.
    ///
    /// Returns `Ok(None)` once the bus is closed.
    async fn recv(&self) -> io::Result<Option<Frame>>;
}
