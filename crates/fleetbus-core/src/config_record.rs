//! Firmware config record image and CRC16.
//!
//! At boot the firmware computes a CRC over its in-memory `NodeInfo` struct
//! and reports it in the identity frame. To verify it we rebuild that struct
//! byte for byte from the interview and run the same CRC.
//!
//! # Layout
//!
//! ```text
//! offset  size  field
//! 0       16*8  slot[i]
//!   +0      3     raw config bytes
//!   +3      1     reserved (0)
//!   +4      4     runtime data (0 for checksum purposes)
//!   +8      2     intro arbitration id      (LE)
//!   +10     2     telemetry arbitration id  (LE, 0 if absent)
//!   +12     1     intro frame length (8)
//!   +13     1     telemetry frame length
//!   +14     1     persist flag (0/1)
//!   +15     1     padding (0)
//! 128     4     node identity             (LE)
//! 132     2     identity arbitration id   (LE)
//! 134     1     identity frame length (8)
//! 135     1     declared submodule count
//! ```
//!
//! The memory image is little-endian while the wire is big-endian. The
//! `zerocopy` little-endian integer types make the distinction a type error
//! rather than a convention.

use std::mem::size_of;

use zerocopy::{
    Immutable, IntoBytes,
    byteorder::little_endian::{U16, U32},
};

use fleetbus_proto::NodeId;

use crate::registry::{MAX_SUBMODULES, NodeRecord, Submodule};

/// CCITT polynomial.
pub const CRC16_POLY: u16 = 0x1021;

/// CCITT-FALSE initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no final XOR).
///
/// Matches the ESP32 ROM `crc16_be` the firmware uses.
pub fn crc16_ccitt_false(bytes: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &byte in bytes {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ CRC16_POLY } else { crc << 1 };
        }
    }
    crc
}

/// Frame length the firmware stores for intro and identity frames.
const FULL_FRAME_LEN: u8 = 8;

#[derive(Debug, Clone, Copy, IntoBytes, Immutable)]
#[repr(C)]
struct SlotImage {
    config: [u8; 3],
    reserved: u8,
    runtime: [u8; 4],
    intro_frame_id: U16,
    telemetry_frame_id: U16,
    intro_len: u8,
    telemetry_len: u8,
    persist: u8,
    padding: u8,
}

impl SlotImage {
    const EMPTY: Self = Self {
        config: [0; 3],
        reserved: 0,
        runtime: [0; 4],
        intro_frame_id: U16::new(0),
        telemetry_frame_id: U16::new(0),
        intro_len: 0,
        telemetry_len: 0,
        persist: 0,
        padding: 0,
    };

    fn from_submodule(sub: &Submodule) -> Self {
        let mut slot = Self::EMPTY;
        slot.config = sub.config.unwrap_or_default();
        slot.intro_frame_id = U16::new(sub.intro_frame_id);
        slot.intro_len = FULL_FRAME_LEN;
        if let Some(telemetry) = sub.telemetry {
            slot.telemetry_frame_id = U16::new(telemetry.frame_id);
            slot.telemetry_len = telemetry.dlc;
            slot.persist = u8::from(telemetry.persist);
        }
        slot
    }
}

/// Reconstructed firmware config record.
#[derive(Debug, Clone, Copy, IntoBytes, Immutable)]
#[repr(C)]
pub struct ConfigRecord {
    slots: [SlotImage; MAX_SUBMODULES],
    node_id: U32,
    identity_frame_id: U16,
    identity_len: u8,
    submodule_count: u8,
}

const _: () = assert!(size_of::<SlotImage>() == ConfigRecord::SLOT_SIZE);
const _: () = assert!(size_of::<ConfigRecord>() == ConfigRecord::SIZE);

impl ConfigRecord {
    /// Total image size.
    pub const SIZE: usize = 136;

    /// Size of one submodule slot.
    pub const SLOT_SIZE: usize = 16;

    /// Image for a node with no submodules and no identity.
    pub const fn empty() -> Self {
        Self {
            slots: [SlotImage::EMPTY; MAX_SUBMODULES],
            node_id: U32::new(0),
            identity_frame_id: U16::new(0),
            identity_len: 0,
            submodule_count: 0,
        }
    }

    /// Rebuild the image from what the interview collected.
    ///
    /// Slots the node never described stay zero, as does the runtime data
    /// area of every slot.
    pub fn from_node(record: &NodeRecord) -> Self {
        let mut image = Self::empty().with_identity(
            record.id(),
            record.identity_frame_id().unwrap_or(0),
            record.declared_count(),
        );
        for (index, sub) in record.submodules() {
            image = image.with_slot(index, sub);
        }
        image
    }

    /// Set the identity metadata block.
    pub fn with_identity(mut self, node: NodeId, identity_frame_id: u16, count: u8) -> Self {
        self.node_id = U32::new(node.get());
        self.identity_frame_id = U16::new(identity_frame_id);
        self.identity_len = FULL_FRAME_LEN;
        self.submodule_count = count;
        self
    }

    /// Fill slot `index`. Indices past the last slot are ignored.
    pub fn with_slot(mut self, index: u8, sub: &Submodule) -> Self {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = SlotImage::from_submodule(sub);
        }
        self
    }

    /// Raw image bytes, exactly as the firmware lays them out.
    pub fn bytes(&self) -> &[u8] {
        self.as_bytes()
    }

    /// CRC16 of the image.
    pub fn checksum(&self) -> u16 {
        crc16_ccitt_false(self.as_bytes())
    }

    /// Hex dump, 16 bytes per row, for comparing against firmware serial
    /// dumps.
    pub fn hex_rows(&self) -> Vec<String> {
        self.as_bytes()
            .chunks(Self::SLOT_SIZE)
            .enumerate()
            .map(|(row, chunk)| format!("{:04X}: {}", row * Self::SLOT_SIZE, hex::encode_upper(chunk)))
            .collect()
    }
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use fleetbus_proto::Telemetry;

    use super::*;

    #[test]
    fn crc_check_value() {
        assert_eq!(crc16_ccitt_false(b"123456789"), 0x29B1);
        assert_eq!(crc16_ccitt_false(&[]), CRC16_INIT);
    }

    #[test]
    fn pinned_identity_fixture() {
        let mut buf = [0u8; ConfigRecord::SIZE];
        buf[128..132].copy_from_slice(&0x1122_3344u32.to_le_bytes());
        buf[135] = 2;
        assert_eq!(crc16_ccitt_false(&buf), 0xF670);
    }

    #[test]
    fn metadata_is_little_endian() {
        let mut record = NodeRecord::new(NodeId::new(0x1122_3344), Instant::now());
        record.identity_frame_id = Some(0x079C);
        record.declared_count = 2;

        let image = ConfigRecord::from_node(&record);
        let bytes = image.bytes();
        assert_eq!(bytes.len(), ConfigRecord::SIZE);
        assert_eq!(&bytes[128..136], &[0x44, 0x33, 0x22, 0x11, 0x9C, 0x07, 8, 2]);
        assert!(bytes[..128].iter().all(|b| *b == 0));
    }

    #[test]
    fn slot_layout_matches_firmware() {
        let mut record = NodeRecord::new(NodeId::new(1), Instant::now());
        record.declared_count = 2;
        if let Some(slot) = record.slot_mut(1, 0x0701) {
            slot.config = Some([0xAA, 0xBB, 0xCC]);
            slot.telemetry = Some(Telemetry { frame_id: 0x0518, dlc: 6, persist: true });
        }

        let image = ConfigRecord::from_node(&record);
        let slot = &image.bytes()[16..32];
        assert_eq!(
            slot,
            &[0xAA, 0xBB, 0xCC, 0, 0, 0, 0, 0, 0x01, 0x07, 0x18, 0x05, 8, 6, 1, 0]
        );
        assert!(image.bytes()[..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn builder_matches_interview_reconstruction() {
        let sub = Submodule {
            config: Some([9, 8, 7]),
            intro_frame_id: 0x0702,
            telemetry: Some(Telemetry { frame_id: 0x0300, dlc: 2, persist: false }),
        };
        let mut record = NodeRecord::new(NodeId::new(0xAB), Instant::now());
        record.identity_frame_id = Some(0x079C);
        record.declared_count = 1;
        if let Some(slot) = record.slot_mut(0, sub.intro_frame_id) {
            *slot = sub;
        }

        let built = ConfigRecord::empty()
            .with_identity(NodeId::new(0xAB), 0x079C, 1)
            .with_slot(0, &sub)
            .with_slot(8, &sub);
        assert_eq!(built.bytes(), ConfigRecord::from_node(&record).bytes());
    }

    #[test]
    fn absent_telemetry_leaves_zeros() {
        let mut record = NodeRecord::new(NodeId::new(1), Instant::now());
        record.declared_count = 1;
        if let Some(slot) = record.slot_mut(0, 0x0720) {
            slot.config = Some([1, 2, 3]);
        }

        let image = ConfigRecord::from_node(&record);
        assert_eq!(&image.bytes()[..16], &[1, 2, 3, 0, 0, 0, 0, 0, 0x20, 0x07, 0, 0, 8, 0, 0, 0]);
    }

    #[test]
    fn hex_rows_snapshot() {
        let mut record = NodeRecord::new(NodeId::new(0x25A5_6D84), Instant::now());
        record.identity_frame_id = Some(0x079C);
        record.declared_count = 1;
        if let Some(slot) = record.slot_mut(0, 0x0701) {
            slot.config = Some([0x00, 0x01, 0x07]);
            slot.telemetry = Some(Telemetry { frame_id: 0x0210, dlc: 8, persist: false });
        }

        let rows = ConfigRecord::from_node(&record).hex_rows();
        assert_eq!(rows.len(), 9);
        insta::assert_snapshot!(rows.join("\n"), @r"
        0000: 00010700000000000107100208080000
        0010: 00000000000000000000000000000000
        0020: 00000000000000000000000000000000
        0030: 00000000000000000000000000000000
        0040: 00000000000000000000000000000000
        0050: 00000000000000000000000000000000
        0060: 00000000000000000000000000000000
        0070: 00000000000000000000000000000000
        0080: 846DA5259C070801
        ");
    }
}
