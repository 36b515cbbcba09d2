//! Node registry.
//!
//! One [`NodeRecord`] per identity ever seen on the bus. Records are created
//! by the first frame that references an unseen identity and are never
//! removed by the core; deciding that a node is stale is left to whoever reads
//! the snapshots.

use std::{collections::BTreeMap, time::Instant};

use fleetbus_proto::{NodeId, Telemetry};
use serde::{Deserialize, Serialize};

use crate::provisioning::ProvisioningState;

/// Number of submodule slots a node can hold.
pub const MAX_SUBMODULES: usize = 8;

/// One configurable hardware function slot on a node.
///
/// Part A and Part B of the interview fill different fields and may arrive in
/// either order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodule {
    /// Raw configuration bytes from Part A
    pub config: Option<[u8; 3]>,
    /// Arbitration id the submodule was described under (its hardware type)
    pub intro_frame_id: u16,
    /// Telemetry routing from Part B
    pub telemetry: Option<Telemetry>,
}

impl Submodule {
    fn new(intro_frame_id: u16) -> Self {
        Self { config: None, intro_frame_id, telemetry: None }
    }

    /// Both halves have been received.
    pub fn is_complete(&self) -> bool {
        self.config.is_some() && self.telemetry.is_some()
    }
}

/// Where a node is in the interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewPhase {
    /// Waiting for the identity frame (new node or new discovery cycle)
    AwaitingIdentity,
    /// Identity received, collecting submodule frames
    Interviewing,
    /// Last Part B received and checksum computed
    Complete,
}

/// Operator-facing verdict on a node's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumStatus {
    /// Interview still running, nothing to compare yet
    Pending,
    /// Node reported the unconfigured sentinel
    NeedsConfig,
    /// Reconstructed record matches the boot checksum
    Match,
    /// Reconstructed record differs from the boot checksum
    Modified,
}

/// Interview and provisioning state for one node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    id: NodeId,
    pub(crate) identity_frame_id: Option<u16>,
    pub(crate) declared_count: u8,
    pub(crate) reported_checksum: Option<u16>,
    pub(crate) submodules: [Option<Submodule>; MAX_SUBMODULES],
    pub(crate) interview_complete: bool,
    pub(crate) computed_checksum: Option<u16>,
    pub(crate) last_seen: Instant,
    pub(crate) provisioning: ProvisioningState,
    pub(crate) provisioning_started_at: Option<Instant>,
}

impl NodeRecord {
    /// Fresh record for a node first seen at `now`.
    pub fn new(id: NodeId, now: Instant) -> Self {
        Self {
            id,
            identity_frame_id: None,
            declared_count: 0,
            reported_checksum: None,
            submodules: [None; MAX_SUBMODULES],
            interview_complete: false,
            computed_checksum: None,
            last_seen: now,
            provisioning: ProvisioningState::Idle,
            provisioning_started_at: None,
        }
    }

    /// Node identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Arbitration id of the identity frame, once received.
    pub fn identity_frame_id(&self) -> Option<u16> {
        self.identity_frame_id
    }

    /// Submodule count from the identity frame (0 before it arrives).
    pub fn declared_count(&self) -> u8 {
        self.declared_count
    }

    /// Checksum the firmware computed at boot. Survives discovery cycles.
    pub fn reported_checksum(&self) -> Option<u16> {
        self.reported_checksum
    }

    /// Submodule in slot `index`.
    pub fn submodule(&self, index: usize) -> Option<&Submodule> {
        self.submodules.get(index).and_then(Option::as_ref)
    }

    /// All occupied slots with their indices.
    pub fn submodules(&self) -> impl Iterator<Item = (u8, &Submodule)> {
        self.submodules
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index as u8, s)))
    }

    /// Whether the interview finished this cycle.
    pub fn interview_complete(&self) -> bool {
        self.interview_complete
    }

    /// Checksum of the reconstructed config record. Only `Some` once the
    /// interview is complete.
    pub fn computed_checksum(&self) -> Option<u16> {
        self.computed_checksum
    }

    /// Last time any frame referenced this node.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Provisioning state. Survives discovery cycles.
    pub fn provisioning(&self) -> ProvisioningState {
        self.provisioning
    }

    /// When the outstanding provisioning command was issued.
    pub fn provisioning_started_at(&self) -> Option<Instant> {
        self.provisioning_started_at
    }

    /// Current interview phase.
    pub fn phase(&self) -> InterviewPhase {
        if self.interview_complete {
            InterviewPhase::Complete
        } else if self.identity_frame_id.is_some() {
            InterviewPhase::Interviewing
        } else {
            InterviewPhase::AwaitingIdentity
        }
    }

    /// Compare computed and reported checksums.
    pub fn checksum_status(&self, unconfigured: u16) -> ChecksumStatus {
        match (self.reported_checksum, self.computed_checksum) {
            (Some(reported), _) if reported == unconfigured => ChecksumStatus::NeedsConfig,
            (Some(reported), Some(computed)) if self.interview_complete => {
                if reported == computed { ChecksumStatus::Match } else { ChecksumStatus::Modified }
            },
            _ => ChecksumStatus::Pending,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Mutable slot, creating it with `intro_frame_id` if empty.
    pub(crate) fn slot_mut(&mut self, index: u8, intro_frame_id: u16) -> Option<&mut Submodule> {
        let slot = self.submodules.get_mut(index as usize)?;
        Some(slot.get_or_insert_with(|| Submodule::new(intro_frame_id)))
    }

    /// Forget everything learned in the current interview cycle.
    ///
    /// Reported checksum and provisioning state are kept.
    pub(crate) fn reset_interview(&mut self) {
        self.identity_frame_id = None;
        self.declared_count = 0;
        self.submodules = [None; MAX_SUBMODULES];
        self.interview_complete = false;
        self.computed_checksum = None;
    }
}

/// All known nodes, ordered by identity.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: BTreeMap<NodeId, NodeRecord>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no node has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record for `id`.
    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    /// Iterate records in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut NodeRecord> {
        self.nodes.values_mut()
    }

    /// Record for `id`, created if unseen. Updates `last_seen` either way.
    ///
    /// The flag is true when the record was created by this call.
    pub(crate) fn touch(&mut self, id: NodeId, now: Instant) -> (&mut NodeRecord, bool) {
        let mut created = false;
        let record = self.nodes.entry(id).or_insert_with(|| {
            created = true;
            NodeRecord::new(id, now)
        });
        record.touch(now);
        (record, created)
    }

    /// Start a new discovery cycle for every node.
    pub(crate) fn reset_interviews(&mut self) {
        for record in self.nodes.values_mut() {
            record.reset_interview();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_creates_once() {
        let now = Instant::now();
        let mut registry = Registry::new();
        let id = NodeId::new(7);

        let (_, created) = registry.touch(id, now);
        assert!(created);
        let (_, created) = registry.touch(id, now);
        assert!(!created);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reset_keeps_reported_checksum_and_provisioning() {
        let now = Instant::now();
        let mut record = NodeRecord::new(NodeId::new(1), now);
        record.identity_frame_id = Some(0x79C);
        record.declared_count = 1;
        record.reported_checksum = Some(0x1234);
        record.interview_complete = true;
        record.computed_checksum = Some(0x1234);
        record.provisioning = ProvisioningState::Success;
        record.slot_mut(0, 0x701);

        record.reset_interview();

        assert_eq!(record.phase(), InterviewPhase::AwaitingIdentity);
        assert_eq!(record.declared_count(), 0);
        assert_eq!(record.submodules().count(), 0);
        assert_eq!(record.computed_checksum(), None);
        assert_eq!(record.reported_checksum(), Some(0x1234));
        assert_eq!(record.provisioning(), ProvisioningState::Success);
    }

    #[test]
    fn slot_out_of_range_is_none() {
        let mut record = NodeRecord::new(NodeId::new(1), Instant::now());
        assert!(record.slot_mut(8, 0x701).is_none());
        assert!(record.slot_mut(7, 0x701).is_some());
    }

    #[test]
    fn checksum_status_verdicts() {
        let mut record = NodeRecord::new(NodeId::new(1), Instant::now());
        assert_eq!(record.checksum_status(0xFFFF), ChecksumStatus::Pending);

        record.reported_checksum = Some(0xFFFF);
        assert_eq!(record.checksum_status(0xFFFF), ChecksumStatus::NeedsConfig);

        record.reported_checksum = Some(0xAAAA);
        record.computed_checksum = Some(0xAAAA);
        record.interview_complete = true;
        assert_eq!(record.checksum_status(0xFFFF), ChecksumStatus::Match);

        record.computed_checksum = Some(0xBBBB);
        assert_eq!(record.checksum_status(0xFFFF), ChecksumStatus::Modified);
    }
}
