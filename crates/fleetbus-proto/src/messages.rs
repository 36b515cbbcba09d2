//! Typed protocol messages.
//!
//! Inbound messages (node to core) decode from a [`Frame`]; outbound messages
//! encode into one. Both directions are implemented for every message so the
//! simulation harness can play the firmware side with the same code.

use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    frame::Frame,
    ids::MessageIds,
    node_id::NodeId,
};

/// First frame of a node's interview.
///
/// ```text
/// [identity:4][submodule count:1][boot checksum:2]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityAnnouncement {
    /// Announcing node
    pub node: NodeId,
    /// Number of submodules the node will describe
    pub submodule_count: u8,
    /// Checksum the firmware computed over its config record at boot
    pub reported_checksum: u16,
}

impl IdentityAnnouncement {
    /// Minimum payload length.
    pub const LEN: usize = 7;

    /// Decode from an interview-band frame.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let data = frame.require(Self::LEN)?;
        Ok(Self {
            node: NodeId::from_payload(data)?,
            submodule_count: data[4],
            reported_checksum: u16::from_be_bytes([data[5], data[6]]),
        })
    }

    /// Encode as a full 8-byte frame under `frame_id`.
    pub fn encode(&self, frame_id: u16) -> Result<Frame> {
        let mut payload = [0u8; Frame::MAX_DATA_LEN];
        payload[..4].copy_from_slice(&self.node.to_be_bytes());
        payload[4] = self.submodule_count;
        payload[5..7].copy_from_slice(&self.reported_checksum.to_be_bytes());
        Frame::new(frame_id, &payload)
    }
}

/// Telemetry routing for a submodule (Part B payload).
///
/// ```text
/// [frame id:2][P...DDDD]   P = persist flag, DDDD = dlc
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Telemetry {
    /// Arbitration id the submodule publishes data under
    pub frame_id: u16,
    /// Length of the data frame (0..=15)
    pub dlc: u8,
    /// Whether the submodule's state survives reboot
    pub persist: bool,
}

impl Telemetry {
    const DLC_MASK: u8 = 0x0F;
    const PERSIST_FLAG: u8 = 0x80;

    /// Decode the three Part B bytes.
    pub fn from_wire(bytes: [u8; 3]) -> Self {
        Self {
            frame_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            dlc: bytes[2] & Self::DLC_MASK,
            persist: bytes[2] & Self::PERSIST_FLAG != 0,
        }
    }

    /// Encode into the three Part B bytes.
    pub fn to_wire(&self) -> [u8; 3] {
        let [hi, lo] = self.frame_id.to_be_bytes();
        let flags = if self.persist { Self::PERSIST_FLAG } else { 0 };
        [hi, lo, (self.dlc & Self::DLC_MASK) | flags]
    }
}

/// One half of a submodule description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmodulePart {
    /// Part A: three raw configuration bytes
    Config([u8; 3]),
    /// Part B: telemetry routing
    Telemetry(Telemetry),
}

/// Submodule description frame.
///
/// ```text
/// [identity:4][B|index:1][part data:3]
/// ```
///
/// The high bit of byte 4 selects Part B. The index is not range-checked
/// here; the interview machine decides what indices it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmoduleReport {
    /// Reporting node
    pub node: NodeId,
    /// Submodule slot index (low 7 bits of byte 4)
    pub index: u8,
    /// Which half this frame carries
    pub part: SubmodulePart,
}

impl SubmoduleReport {
    /// Required payload length.
    pub const LEN: usize = 8;

    const PART_B_FLAG: u8 = 0x80;
    const INDEX_MASK: u8 = 0x7F;

    /// Decode from an interview-band frame.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let data = frame.require(Self::LEN)?;
        let selector = data[4];
        let bytes = [data[5], data[6], data[7]];
        let part = if selector & Self::PART_B_FLAG == 0 {
            SubmodulePart::Config(bytes)
        } else {
            SubmodulePart::Telemetry(Telemetry::from_wire(bytes))
        };

        Ok(Self { node: NodeId::from_payload(data)?, index: selector & Self::INDEX_MASK, part })
    }

    /// Encode under `frame_id` (the submodule's hardware type id).
    pub fn encode(&self, frame_id: u16) -> Result<Frame> {
        let mut payload = [0u8; Self::LEN];
        payload[..4].copy_from_slice(&self.node.to_be_bytes());
        let (flag, bytes) = match self.part {
            SubmodulePart::Config(cfg) => (0, cfg),
            SubmodulePart::Telemetry(t) => (Self::PART_B_FLAG, t.to_wire()),
        };
        payload[4] = (self.index & Self::INDEX_MASK) | flag;
        payload[5..].copy_from_slice(&bytes);
        Frame::new(frame_id, &payload)
    }
}

/// Node response to a configuration write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningReply {
    /// Configuration persisted to NVS
    Committed(NodeId),
    /// Configuration write rejected or failed
    Failed(NodeId),
}

impl ProvisioningReply {
    /// Node the reply refers to.
    pub fn node(&self) -> NodeId {
        match self {
            Self::Committed(node) | Self::Failed(node) => *node,
        }
    }

    /// Decode a reply, returning `None` if the frame id is not a reply id.
    pub fn decode(ids: &MessageIds, frame: &Frame) -> Result<Option<Self>> {
        let id = frame.id();
        if id == ids.write_config_ack {
            Ok(Some(Self::Committed(NodeId::from_payload(frame.data())?)))
        } else if id == ids.write_config_failed {
            Ok(Some(Self::Failed(NodeId::from_payload(frame.data())?)))
        } else {
            Ok(None)
        }
    }

    /// Encode as a frame.
    pub fn encode(&self, ids: &MessageIds) -> Result<Frame> {
        let id = match self {
            Self::Committed(_) => ids.write_config_ack,
            Self::Failed(_) => ids.write_config_failed,
        };
        Frame::new(id, &self.node().to_be_bytes())
    }
}

/// Commands the core sends onto the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask every node to (re)announce itself
    Discover,
    /// Acknowledge one interview frame, releasing the next
    Ack(NodeId),
    /// Persist the configuration whose checksum is given
    WriteConfig {
        /// Target node
        node: NodeId,
        /// Checksum of the configuration to persist
        checksum: u16,
    },
    /// Wipe persisted configuration
    EraseConfig(NodeId),
    /// Restart the node
    Reboot(NodeId),
}

impl Command {
    /// Node the command is addressed to, `None` for broadcasts.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Self::Discover => None,
            Self::Ack(node)
            | Self::WriteConfig { node, .. }
            | Self::EraseConfig(node)
            | Self::Reboot(node) => Some(*node),
        }
    }

    /// Encode as a frame.
    pub fn encode(&self, ids: &MessageIds) -> Result<Frame> {
        match self {
            Self::Discover => Frame::new(ids.discovery, &[0; 4]),
            Self::Ack(node) => Frame::new(ids.ack, &node.to_be_bytes()),
            Self::WriteConfig { node, checksum } => {
                let mut payload = [0u8; 6];
                payload[..4].copy_from_slice(&node.to_be_bytes());
                payload[4..].copy_from_slice(&checksum.to_be_bytes());
                Frame::new(ids.write_config, &payload)
            },
            Self::EraseConfig(node) => Frame::new(ids.erase_config, &node.to_be_bytes()),
            Self::Reboot(node) => Frame::new(ids.reboot, &node.to_be_bytes()),
        }
    }

    /// Decode a command, returning `None` if the frame id is not a command id.
    pub fn decode(ids: &MessageIds, frame: &Frame) -> Result<Option<Self>> {
        let id = frame.id();
        let data = frame.data();
        let command = if id == ids.discovery {
            Self::Discover
        } else if id == ids.ack {
            Self::Ack(NodeId::from_payload(data)?)
        } else if id == ids.write_config {
            let data = frame.require(6)?;
            Self::WriteConfig {
                node: NodeId::from_payload(data)?,
                checksum: u16::from_be_bytes([data[4], data[5]]),
            }
        } else if id == ids.erase_config {
            Self::EraseConfig(NodeId::from_payload(data)?)
        } else if id == ids.reboot {
            Self::Reboot(NodeId::from_payload(data)?)
        } else {
            return Ok(None);
        };
        Ok(Some(command))
    }
}
