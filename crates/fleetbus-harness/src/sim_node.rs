//! Firmware model.
//!
//! A [`SimNode`] answers the master the way node firmware does: on discovery
//! it queues its identity frame followed by Part A and Part B for each
//! submodule, sends the first, and releases each following frame only when
//! the master acknowledges the previous one. Its boot checksum is computed
//! with the same [`ConfigRecord`] engine the master uses, so a node that has
//! persisted its own configuration reports a matching checksum.

use std::collections::VecDeque;

use fleetbus_core::{ConfigRecord, Submodule, UNCONFIGURED_CHECKSUM};
use fleetbus_proto::{
    Command, Frame, IdentityAnnouncement, MessageIds, NodeId, ProvisioningReply, SubmodulePart,
    SubmoduleReport, Telemetry,
};
use tracing::debug;

/// Arbitration id nodes announce their identity under by default.
pub const DEFAULT_IDENTITY_FRAME_ID: u16 = 0x79C;

/// How a node answers configuration writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBehavior {
    /// Persist and acknowledge
    Accept,
    /// Answer with write-failed
    Reject,
    /// Never answer
    Silent,
}

/// One submodule as the firmware stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSubmodule {
    /// Hardware type id, used as the Part A/B arbitration id
    pub type_id: u16,
    /// Raw configuration bytes
    pub config: [u8; 3],
    /// Telemetry routing
    pub telemetry: Telemetry,
}

impl SimSubmodule {
    fn as_submodule(&self) -> Submodule {
        Submodule {
            config: Some(self.config),
            intro_frame_id: self.type_id,
            telemetry: Some(self.telemetry),
        }
    }
}

/// Simulated node firmware.
#[derive(Debug, Clone)]
pub struct SimNode {
    id: NodeId,
    identity_frame_id: u16,
    submodules: Vec<SimSubmodule>,
    persisted_checksum: u16,
    boot_checksum: u16,
    write_behavior: WriteBehavior,
    outbox: VecDeque<Frame>,
    awaiting_ack: bool,
    frames_sent: usize,
    reboots: usize,
}

impl SimNode {
    /// Never-configured node with no submodules.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            identity_frame_id: DEFAULT_IDENTITY_FRAME_ID,
            submodules: Vec::new(),
            persisted_checksum: UNCONFIGURED_CHECKSUM,
            boot_checksum: UNCONFIGURED_CHECKSUM,
            write_behavior: WriteBehavior::Accept,
            outbox: VecDeque::new(),
            awaiting_ack: false,
            frames_sent: 0,
            reboots: 0,
        }
    }

    /// Add a submodule. Nodes hold at most 8; the master rejects more.
    pub fn with_submodule(mut self, type_id: u16, config: [u8; 3], telemetry: Telemetry) -> Self {
        self.submodules.push(SimSubmodule { type_id, config, telemetry });
        self
    }

    /// Announce identity under a different arbitration id.
    pub fn with_identity_frame_id(mut self, id: u16) -> Self {
        self.identity_frame_id = id;
        self
    }

    /// Pretend the current configuration was persisted before boot.
    pub fn configured(mut self) -> Self {
        self.persisted_checksum = self.config_checksum();
        self.boot_checksum = self.persisted_checksum;
        self
    }

    /// Boot with an arbitrary persisted checksum.
    pub fn with_boot_checksum(mut self, checksum: u16) -> Self {
        self.persisted_checksum = checksum;
        self.boot_checksum = checksum;
        self
    }

    /// Answer writes with `behavior`.
    pub fn with_write_behavior(mut self, behavior: WriteBehavior) -> Self {
        self.write_behavior = behavior;
        self
    }

    /// Node identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Checksum reported in the identity frame.
    pub fn boot_checksum(&self) -> u16 {
        self.boot_checksum
    }

    /// Checksum in non-volatile storage; becomes the boot checksum on reboot.
    pub fn persisted_checksum(&self) -> u16 {
        self.persisted_checksum
    }

    /// CRC of this node's in-memory config record.
    pub fn config_checksum(&self) -> u16 {
        let mut record = ConfigRecord::empty().with_identity(
            self.id,
            self.identity_frame_id,
            self.submodules.len() as u8,
        );
        for (index, sub) in self.submodules.iter().enumerate() {
            record = record.with_slot(index as u8, &sub.as_submodule());
        }
        record.checksum()
    }

    /// Interview frames still waiting for an acknowledgement slot.
    pub fn pending_frames(&self) -> usize {
        self.outbox.len() + usize::from(self.awaiting_ack)
    }

    /// Frames this node has put on the bus.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Reboots since construction.
    pub fn reboots(&self) -> usize {
        self.reboots
    }

    /// React to one frame from the master, returning frames to send.
    pub fn handle(&mut self, ids: &MessageIds, frame: &Frame) -> Vec<Frame> {
        let command = match Command::decode(ids, frame) {
            Ok(Some(command)) => command,
            Ok(None) | Err(_) => return Vec::new(),
        };

        if command.target().is_some_and(|target| target != self.id) {
            return Vec::new();
        }

        let reply = match command {
            Command::Discover => {
                self.queue_interview();
                self.release()
            },
            Command::Ack(_) if self.awaiting_ack => {
                self.awaiting_ack = false;
                self.release()
            },
            Command::Ack(_) => None,
            Command::WriteConfig { checksum, .. } => self.write(ids, checksum),
            Command::EraseConfig(_) => {
                self.persisted_checksum = UNCONFIGURED_CHECKSUM;
                debug!(node = %self.id, "config erased");
                None
            },
            Command::Reboot(_) => {
                self.boot_checksum = self.persisted_checksum;
                self.outbox.clear();
                self.awaiting_ack = false;
                self.reboots += 1;
                debug!(node = %self.id, checksum = self.boot_checksum, "rebooted");
                None
            },
        };

        let frames: Vec<Frame> = reply.into_iter().collect();
        self.frames_sent += frames.len();
        frames
    }

    fn queue_interview(&mut self) {
        self.outbox.clear();
        self.awaiting_ack = false;

        let intro = IdentityAnnouncement {
            node: self.id,
            submodule_count: self.submodules.len() as u8,
            reported_checksum: self.boot_checksum,
        };
        self.outbox.extend(intro.encode(self.identity_frame_id).ok());

        for (index, sub) in self.submodules.iter().enumerate() {
            for part in [SubmodulePart::Config(sub.config), SubmodulePart::Telemetry(sub.telemetry)]
            {
                let report = SubmoduleReport { node: self.id, index: index as u8, part };
                self.outbox.extend(report.encode(sub.type_id).ok());
            }
        }
    }

    fn release(&mut self) -> Option<Frame> {
        let frame = self.outbox.pop_front()?;
        self.awaiting_ack = true;
        Some(frame)
    }

    fn write(&mut self, ids: &MessageIds, checksum: u16) -> Option<Frame> {
        let reply = match self.write_behavior {
            WriteBehavior::Accept => {
                self.persisted_checksum = checksum;
                ProvisioningReply::Committed(self.id)
            },
            WriteBehavior::Reject => ProvisioningReply::Failed(self.id),
            WriteBehavior::Silent => return None,
        };
        reply.encode(ids).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: NodeId = NodeId::new(0x0000_0042);

    fn telemetry() -> Telemetry {
        Telemetry { frame_id: 0x518, dlc: 6, persist: false }
    }

    #[test]
    fn one_frame_per_ack() {
        let ids = MessageIds::default();
        let mut node = SimNode::new(NODE).with_submodule(0x701, [1, 2, 3], telemetry());

        let first = node.handle(&ids, &Command::Discover.encode(&ids).unwrap());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id(), DEFAULT_IDENTITY_FRAME_ID);
        assert_eq!(node.pending_frames(), 3);

        let ack = Command::Ack(NODE).encode(&ids).unwrap();
        assert_eq!(node.handle(&ids, &ack)[0].id(), 0x701);
        assert_eq!(node.handle(&ids, &ack)[0].id(), 0x701);
        assert_eq!(node.pending_frames(), 1);
        assert!(node.handle(&ids, &ack).is_empty());
        assert_eq!(node.pending_frames(), 0);
        assert!(node.handle(&ids, &ack).is_empty());
    }

    #[test]
    fn ignores_other_nodes() {
        let ids = MessageIds::default();
        let mut node = SimNode::new(NODE);
        node.handle(&ids, &Command::Discover.encode(&ids).unwrap());

        let other = Command::Ack(NodeId::new(7)).encode(&ids).unwrap();
        assert!(node.handle(&ids, &other).is_empty());
        assert_eq!(node.pending_frames(), 1);
    }

    #[test]
    fn write_then_reboot_changes_boot_checksum() {
        let ids = MessageIds::default();
        let mut node = SimNode::new(NODE);
        assert_eq!(node.boot_checksum(), UNCONFIGURED_CHECKSUM);

        let write = Command::WriteConfig { node: NODE, checksum: 0x1234 }.encode(&ids).unwrap();
        let reply = node.handle(&ids, &write);
        assert_eq!(reply, vec![ProvisioningReply::Committed(NODE).encode(&ids).unwrap()]);
        assert_eq!(node.boot_checksum(), UNCONFIGURED_CHECKSUM);

        node.handle(&ids, &Command::Reboot(NODE).encode(&ids).unwrap());
        assert_eq!(node.boot_checksum(), 0x1234);
        assert_eq!(node.reboots(), 1);
    }

    #[test]
    fn configured_node_reports_its_own_crc() {
        let node = SimNode::new(NODE).with_submodule(0x701, [1, 2, 3], telemetry()).configured();
        assert_eq!(node.boot_checksum(), node.config_checksum());
        assert_ne!(node.boot_checksum(), UNCONFIGURED_CHECKSUM);
    }
}
