//! Error types for the core state machines.
//!
//! None of these are fatal. [`FrameError`] explains why an inbound frame was
//! dropped, [`CommandError`] why an operator command was refused.

use fleetbus_proto::{NodeId, ProtocolError};
use thiserror::Error;

use crate::provisioning::ProvisioningState;

/// Why an inbound frame was dropped without changing state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload too short (or otherwise undecodable) for the expected layout
    #[error("malformed frame {id:#05x}: {source}")]
    Malformed {
        /// Arbitration id of the dropped frame
        id: u16,
        /// Decoding failure
        source: ProtocolError,
    },

    /// Identity frame declared more submodules than a node can hold
    #[error("node {node} declared {declared} submodules, at most 8 are supported")]
    TooManySubmodules {
        /// Announcing node
        node: NodeId,
        /// Declared count
        declared: u8,
    },

    /// Submodule index outside the range the node declared
    #[error("node {node} reported submodule index {index}, expected 0..{declared}")]
    UnexpectedIndex {
        /// Reporting node
        node: NodeId,
        /// Index carried by the frame
        index: u8,
        /// Count declared in the identity frame
        declared: u8,
    },

    /// Provisioning reply that does not match an outstanding write
    #[error("node {node} sent a provisioning reply while {state:?}")]
    UnexpectedReply {
        /// Replying node
        node: NodeId,
        /// Provisioning state when the reply arrived
        state: ProvisioningState,
    },
}

impl FrameError {
    pub(crate) fn malformed(id: u16, source: ProtocolError) -> Self {
        Self::Malformed { id, source }
    }
}

/// Why an operator command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No record for this node
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Commit requires a finished interview
    #[error("interview for node {0} is not complete")]
    InterviewIncomplete(NodeId),

    /// Computed checksum already matches what the node reported
    #[error("node {node} already runs configuration {checksum:#06x}")]
    NothingToCommit {
        /// Target node
        node: NodeId,
        /// Matching checksum
        checksum: u16,
    },

    /// Submodule index outside 0..8
    #[error("submodule index {0} outside 0..8")]
    IndexOutOfRange(u8),

    /// Raw command carries more than 4 bytes after the identity
    #[error("raw command extra payload of {0} bytes exceeds 4")]
    ExtraTooLong(usize),

    /// Command frame could not be built
    #[error("cannot encode command: {0}")]
    Encode(#[from] ProtocolError),
}

/// Snapshot serialization failure.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// CBOR encoding failed
    #[error("snapshot encoding failed: {0}")]
    Encode(String),

    /// CBOR decoding failed
    #[error("snapshot decoding failed: {0}")]
    Decode(String),
}
