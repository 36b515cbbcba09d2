//! Wire format for the fleetbus protocol.
//!
//! The bus carries classic 11-bit arbitration-id frames with at most 8 data
//! bytes. Every multi-byte field on the wire is big-endian. Node identities
//! are 32-bit values assigned by the firmware and always occupy the first four
//! bytes of any node-addressed payload.
//!
//! This crate only knows how to build and take apart frames. Which frame ids
//! mean what is configurable through [`MessageIds`]; what a frame *does* to a
//! node's state lives in `fleetbus-core`.
//!
//! # Messages
//!
//! ```text
//! discovery   core -> bus   00 00 00 00
//! ack         core -> bus   [identity:4]
//! identity    bus  -> core  [identity:4][count:1][checksum:2]
//! submodule   bus  -> core  [identity:4][P|index:1][part data:3]
//! write       core -> bus   [identity:4][checksum:2]
//! write-ack   bus  -> core  [identity:4]
//! write-fail  bus  -> core  [identity:4]
//! erase       core -> bus   [identity:4]
//! reboot      core -> bus   [identity:4]
//! ```
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod ids;
pub mod messages;
pub mod node_id;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use ids::MessageIds;
pub use messages::{
    Command, IdentityAnnouncement, ProvisioningReply, SubmodulePart, SubmoduleReport, Telemetry,
};
pub use node_id::NodeId;
