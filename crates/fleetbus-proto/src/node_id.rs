//! Node identity.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// 32-bit node identity, assigned by the firmware and unique across the bus.
///
/// On the wire the identity is big-endian; the firmware's in-memory config
/// record stores it little-endian. Use [`NodeId::to_be_bytes`] for frames and
/// [`NodeId::get`] with explicit `to_le_bytes` for memory images.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Size of the identity field on the wire.
    pub const WIRE_LEN: usize = 4;

    /// Wrap a raw identity.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identity value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Wire encoding (big-endian).
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Decode the identity from the first four payload bytes.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = payload
            .get(..Self::WIRE_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProtocolError::PayloadTooShort {
                expected: Self::WIRE_LEN,
                actual: payload.len(),
            })?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId(0x{:08X})", self.0)
    }
}

/// Parses hex with or without a `0x` prefix, which is how operators copy ids
/// out of logs.
impl FromStr for NodeId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidNodeId(s.to_string()))
    }
}
