//! fleetbus protocol core logic
//!
//! Pure state machine logic for discovering, interviewing and provisioning
//! nodes on a shared bus, completely decoupled from I/O.
//!
//! # Architecture
//!
//! Every operation takes the current time as a parameter and returns
//! declarative [`MasterAction`]s (frames to send, events to publish) instead of
//! performing them. A runtime or test harness executes the actions. The same
//! code therefore runs against a real bus, an in-memory simulated fleet, and
//! a fuzzer.
//!
//! ```text
//!   Frame ──> classifier ──┬──> interview ──> config_record (CRC)
//!                          └──> provisioning
//!                                   │
//!                  Master ──────────┴──> Vec<MasterAction>
//! ```
//!
//! # Components
//!
//! - [`classifier`]: routes inbound frames by arbitration id
//! - [`registry`]: node records and their interview/provisioning state
//! - [`interview`]: per-node interview state machine
//! - [`config_record`]: firmware config record image and CRC16
//! - [`provisioning`]: commit/erase/reboot handshake and timeout sweep
//! - [`master`]: facade tying the above together
//! - [`snapshot`]: read-only views for collaborators
//! - [`mod@env`]: Environment abstraction (time)
//! - [`transport`]: Bus transport abstraction
//! - [`error`]: error types

pub mod classifier;
pub mod config_record;
pub mod env;
pub mod error;
pub mod interview;
pub mod master;
pub mod provisioning;
pub mod registry;
pub mod snapshot;
pub mod transport;

pub use config_record::{ConfigRecord, crc16_ccitt_false};
pub use env::Environment;
pub use error::{CommandError, FrameError, SnapshotError};
pub use master::{MAX_RAW_EXTRA, Master, MasterAction, MasterConfig, MasterEvent, Stats};
pub use provisioning::{ProvisioningConfig, ProvisioningState, UNCONFIGURED_CHECKSUM};
pub use registry::{ChecksumStatus, InterviewPhase, NodeRecord, Registry, Submodule};
pub use snapshot::{MasterSnapshot, NodeSnapshot, SubmoduleSnapshot};
pub use transport::BusTransport;
