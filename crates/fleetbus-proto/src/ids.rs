//! Arbitration id table.
//!
//! Firmware revisions have moved the command ids around more than once, so
//! none of them are hard-coded in the state machines. Everything reads the
//! table through a [`MessageIds`] value.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
};

/// Arbitration ids used by the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIds {
    /// Interview acknowledgement, core to node
    pub ack: u16,
    /// Discovery broadcast, core to bus
    pub discovery: u16,
    /// Erase persisted configuration, core to node
    pub erase_config: u16,
    /// Reboot node, core to node
    pub reboot: u16,
    /// Persist configuration, core to node
    pub write_config: u16,
    /// Configuration persisted, node to core
    pub write_config_ack: u16,
    /// Configuration write failed, node to core
    pub write_config_failed: u16,
    /// Band of ids nodes announce identity and submodules under
    pub interview: RangeInclusive<u16>,
}

impl MessageIds {
    /// Default interview band start.
    pub const INTERVIEW_START: u16 = 0x700;
    /// Default interview band end (inclusive).
    pub const INTERVIEW_END: u16 = 0x7FF;

    /// True if `id` falls in the interview band.
    pub fn is_interview(&self, id: u16) -> bool {
        self.interview.contains(&id)
    }

    /// Check that every id fits the 11-bit standard range, that the
    /// interview band is non-empty and that no single-purpose id falls
    /// inside it.
    pub fn validate(&self) -> Result<()> {
        let singles = [
            self.ack,
            self.discovery,
            self.erase_config,
            self.reboot,
            self.write_config,
            self.write_config_ack,
            self.write_config_failed,
        ];
        let band = [*self.interview.start(), *self.interview.end()];

        if let Some(id) = singles.iter().chain(&band).find(|id| **id > Frame::MAX_STANDARD_ID) {
            return Err(ProtocolError::InvalidArbitrationId(u32::from(*id)));
        }

        let [start, end] = band;
        if start > end {
            return Err(ProtocolError::EmptyInterviewBand { start, end });
        }

        match singles.into_iter().find(|id| self.is_interview(*id)) {
            Some(id) => Err(ProtocolError::OverlapsInterviewBand(id)),
            None => Ok(()),
        }
    }
}

impl Default for MessageIds {
    fn default() -> Self {
        Self {
            ack: 0x400,
            discovery: 0x401,
            erase_config: 0x434,
            reboot: 0x435,
            write_config: 0x436,
            write_config_ack: 0x526,
            write_config_failed: 0x528,
            interview: Self::INTERVIEW_START..=Self::INTERVIEW_END,
        }
    }
}
