//! Classic bus frame.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// A single bus frame: 11-bit arbitration id plus up to 8 data bytes.
///
/// The data buffer is fixed-size so frames are `Copy` and never allocate.
/// Bytes past `len` are always zero, which keeps derived equality honest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    id: u16,
    len: u8,
    data: [u8; Frame::MAX_DATA_LEN],
}

impl Frame {
    /// Maximum number of data bytes in a classic frame.
    pub const MAX_DATA_LEN: usize = 8;

    /// Highest valid standard (11-bit) arbitration id.
    pub const MAX_STANDARD_ID: u16 = 0x7FF;

    /// Build a frame, validating the id range and payload length.
    pub fn new(id: u16, payload: &[u8]) -> Result<Self> {
        if id > Self::MAX_STANDARD_ID {
            return Err(ProtocolError::InvalidArbitrationId(u32::from(id)));
        }
        if payload.len() > Self::MAX_DATA_LEN {
            return Err(ProtocolError::PayloadTooLong { len: payload.len() });
        }

        let mut data = [0u8; Self::MAX_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self { id, len: payload.len() as u8, data })
    }

    /// Build a frame from a raw 32-bit identifier as reported by a driver.
    ///
    /// Extended identifiers are rejected; the protocol only uses standard ids.
    pub fn from_raw(raw_id: u32, payload: &[u8]) -> Result<Self> {
        let id = u16::try_from(raw_id)
            .ok()
            .filter(|id| *id <= Self::MAX_STANDARD_ID)
            .ok_or(ProtocolError::InvalidArbitrationId(raw_id))?;
        Self::new(id, payload)
    }

    /// Arbitration id.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Data bytes actually carried by the frame.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Number of data bytes (the frame's DLC).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True if the frame carries no data.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the payload, failing if it is shorter than `min` bytes.
    pub fn require(&self, min: usize) -> Result<&[u8]> {
        if self.len() < min {
            return Err(ProtocolError::PayloadTooShort { expected: min, actual: self.len() });
        }
        Ok(self.data())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#05x}, [{}])", self.id, hex::encode_upper(self.data()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pads_unused_bytes() {
        let frame = Frame::new(0x400, &[1, 2, 3]).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame, Frame::new(0x400, &[1, 2, 3]).unwrap());
    }

    #[test]
    fn rejects_extended_ids() {
        assert_eq!(Frame::new(0x800, &[]), Err(ProtocolError::InvalidArbitrationId(0x800)));
        assert_eq!(
            Frame::from_raw(0x1_0000, &[]),
            Err(ProtocolError::InvalidArbitrationId(0x1_0000))
        );
    }

    #[test]
    fn rejects_oversized_payload() {
        assert_eq!(Frame::new(0x400, &[0; 9]), Err(ProtocolError::PayloadTooLong { len: 9 }));
    }

    #[test]
    fn require_reports_short_payload() {
        let frame = Frame::new(0x700, &[1, 2]).unwrap();
        assert_eq!(frame.require(4), Err(ProtocolError::PayloadTooShort { expected: 4, actual: 2 }));
        assert!(frame.require(2).is_ok());
    }

    #[test]
    fn debug_is_compact() {
        let frame = Frame::new(0x401, &[0, 0, 0, 0]).unwrap();
        assert_eq!(format!("{frame:?}"), "Frame(0x401, [00000000])");
    }
}
