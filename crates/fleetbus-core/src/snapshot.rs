//! Read-only views of master state.
//!
//! Collaborators (dashboards, the CLI) never borrow the registry. They get a
//! [`MasterSnapshot`] captured under the lock, which is plain data and can be
//! shipped out of process as CBOR.

use std::time::{Duration, Instant};

use fleetbus_proto::NodeId;
use serde::{Deserialize, Serialize};

use crate::{
    error::SnapshotError,
    master::{Master, Stats},
    provisioning::ProvisioningState,
    registry::{ChecksumStatus, InterviewPhase, NodeRecord, Submodule},
};

/// One occupied submodule slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleSnapshot {
    /// Slot index, 0..8
    pub index: u8,
    /// Slot contents
    pub submodule: Submodule,
}

/// Point-in-time view of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node identity
    pub id: NodeId,
    /// Identity frame arbitration id, once received this cycle
    pub identity_frame_id: Option<u16>,
    /// Declared submodule count
    pub declared_count: u8,
    /// Boot checksum the node reported
    pub reported_checksum: Option<u16>,
    /// Checksum of the reconstructed record
    pub computed_checksum: Option<u16>,
    /// Interview phase
    pub phase: InterviewPhase,
    /// Checksum verdict
    pub checksum_status: ChecksumStatus,
    /// Occupied slots in index order
    pub submodules: Vec<SubmoduleSnapshot>,
    /// Time since the node was last heard from
    pub age: Duration,
    /// Provisioning state
    pub provisioning: ProvisioningState,
    /// Time since the last provisioning command, if any
    pub provisioning_elapsed: Option<Duration>,
}

impl NodeSnapshot {
    fn capture(record: &NodeRecord, status: ChecksumStatus, now: Instant) -> Self {
        Self {
            id: record.id(),
            identity_frame_id: record.identity_frame_id(),
            declared_count: record.declared_count(),
            reported_checksum: record.reported_checksum(),
            computed_checksum: record.computed_checksum(),
            phase: record.phase(),
            checksum_status: status,
            submodules: record
                .submodules()
                .map(|(index, submodule)| SubmoduleSnapshot { index, submodule: *submodule })
                .collect(),
            age: now.saturating_duration_since(record.last_seen()),
            provisioning: record.provisioning(),
            provisioning_elapsed: record
                .provisioning_started_at()
                .map(|started| now.saturating_duration_since(started)),
        }
    }

    /// Whether the interview finished this cycle.
    pub fn interview_complete(&self) -> bool {
        self.phase == InterviewPhase::Complete
    }
}

/// Point-in-time view of the whole master.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSnapshot {
    /// Nodes in identity order
    pub nodes: Vec<NodeSnapshot>,
    /// Counters at capture time
    pub stats: Stats,
}

impl MasterSnapshot {
    pub(crate) fn capture(master: &Master, now: Instant) -> Self {
        let nodes = master
            .registry()
            .iter()
            .map(|record| NodeSnapshot::capture(record, master.checksum_status(record), now))
            .collect();
        Self { nodes, stats: master.stats() }
    }

    /// Snapshot of one node.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Encode as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, SnapshotError> {
        ciborium::from_reader(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use fleetbus_proto::Frame;
    use hex_literal::hex;

    use super::*;
    use crate::master::MasterConfig;

    #[test]
    fn captures_interview_progress() {
        let start = Instant::now();
        let mut master = Master::new(MasterConfig::default());
        let identity = Frame::new(0x79C, &hex!("11223344 02 FFFF 00")).unwrap();
        let part_a = Frame::new(0x702, &hex!("11223344 01 0A0B0C")).unwrap();
        master.handle_frame(&identity, start).unwrap();
        master.handle_frame(&part_a, start).unwrap();

        let snapshot = master.snapshot(start + Duration::from_secs(3));
        let node = snapshot.node(NodeId::new(0x1122_3344)).unwrap();

        assert_eq!(node.phase, InterviewPhase::Interviewing);
        assert_eq!(node.checksum_status, ChecksumStatus::NeedsConfig);
        assert_eq!(node.age, Duration::from_secs(3));
        assert_eq!(node.provisioning_elapsed, None);
        assert_eq!(node.submodules.len(), 1);
        assert_eq!(node.submodules[0].index, 1);
        assert_eq!(snapshot.stats.acks_sent, 2);
    }

    #[test]
    fn cbor_preserves_snapshot() {
        let now = Instant::now();
        let mut master = Master::new(MasterConfig::default());
        let identity = Frame::new(0x79C, &hex!("11223344 00 ABCD 00")).unwrap();
        master.handle_frame(&identity, now).unwrap();

        let snapshot = master.snapshot(now);
        let bytes = snapshot.to_cbor().unwrap();
        assert_eq!(MasterSnapshot::from_cbor(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn garbage_cbor_is_an_error() {
        assert!(matches!(MasterSnapshot::from_cbor(&[0xFF, 0x00]), Err(SnapshotError::Decode(_))));
    }
}
