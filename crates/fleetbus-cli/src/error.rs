use std::io;

use fleetbus_app::RuntimeError;
use fleetbus_core::{ProvisioningState, SnapshotError};
use fleetbus_proto::{NodeId, ProtocolError};
use thiserror::Error;

/// Everything that can end a CLI invocation early.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid arbitration id table: {0}")]
    Ids(#[from] ProtocolError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    #[error("cannot open CAN interface {iface}: {source}")]
    Open { iface: String, source: io::Error },

    #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
    #[error("SocketCAN support is not built in; rebuild with --features socketcan on Linux")]
    SocketCanUnavailable,

    #[error("node {0} did not finish its interview")]
    NotInterviewed(NodeId),

    #[error("node {node} ended provisioning in state {state}")]
    Provisioning { node: NodeId, state: ProvisioningState },

    #[error("invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
