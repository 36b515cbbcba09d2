//! SocketCAN transport.

use std::io;

use async_trait::async_trait;
use fleetbus_core::BusTransport;
use fleetbus_proto::Frame;
use socketcan::{CanFrame, EmbeddedFrame, Id, StandardId, tokio::CanSocket};
use tracing::trace;

/// A raw CAN socket bound to one interface.
pub struct SocketCanBus {
    socket: CanSocket,
}

impl SocketCanBus {
    pub fn open(iface: &str) -> io::Result<Self> {
        Ok(Self { socket: CanSocket::open(iface)? })
    }
}

#[async_trait]
impl BusTransport for SocketCanBus {
    async fn send(&self, frame: Frame) -> io::Result<()> {
        let id = StandardId::new(frame.id()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("bad standard id {:#x}", frame.id()))
        })?;
        let can = CanFrame::new(id, frame.data())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "payload too long"))?;
        self.socket.write_frame(can).await
    }

    /// Never yields `None`: a CAN interface has no end of stream.
    async fn recv(&self) -> io::Result<Option<Frame>> {
        loop {
            let CanFrame::Data(data) = self.socket.read_frame().await? else {
                continue;
            };
            let raw = match data.id() {
                Id::Standard(id) => u32::from(id.as_raw()),
                Id::Extended(id) => id.as_raw(),
            };
            match Frame::from_raw(raw, data.data()) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => trace!(raw, error = %e, "skipping frame"),
            }
        }
    }
}
