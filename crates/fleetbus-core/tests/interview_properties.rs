//! Interview property tests.
//!
//! Random node configurations are driven through a [`Master`] frame by frame
//! and the computed checksum is compared against a reference image built
//! byte by byte from the firmware struct layout.
//!
//! ```text
//! proptest generates: NodeModel
//!                          │
//!           ┌──────────────┴──────────────┐
//!           ▼                             ▼
//!   reference_image()              interview frames
//!   (hand-laid 136 bytes)          ──> Master
//!           │                             │
//!           └──────── crc16 == computed ──┘
//! ```

use std::time::Instant;

use fleetbus_core::{Master, MasterAction, MasterConfig, crc16_ccitt_false};
use fleetbus_proto::{
    Frame, IdentityAnnouncement, NodeId, SubmodulePart, SubmoduleReport, Telemetry,
};
use proptest::prelude::*;

const IDENTITY_FRAME_ID: u16 = 0x79C;

#[derive(Debug, Clone)]
struct SlotModel {
    type_id: u16,
    config: [u8; 3],
    telemetry: Telemetry,
    /// Send Part B before Part A
    b_first: bool,
}

#[derive(Debug, Clone)]
struct NodeModel {
    node: NodeId,
    slots: Vec<SlotModel>,
}

fn slot_strategy() -> impl Strategy<Value = SlotModel> {
    (0x700u16..=0x7FF, any::<[u8; 3]>(), 0u16..=0x7FF, 0u8..=15, any::<bool>(), any::<bool>())
        .prop_map(|(type_id, config, frame_id, dlc, persist, b_first)| SlotModel {
            type_id,
            config,
            telemetry: Telemetry { frame_id, dlc, persist },
            b_first,
        })
}

fn node_strategy() -> impl Strategy<Value = NodeModel> {
    (any::<u32>(), proptest::collection::vec(slot_strategy(), 0..=8))
        .prop_map(|(raw, slots)| NodeModel { node: NodeId::new(raw), slots })
}

/// Firmware struct laid out by hand, independent of `ConfigRecord`.
fn reference_image(model: &NodeModel) -> [u8; 136] {
    let mut buf = [0u8; 136];
    for (index, slot) in model.slots.iter().enumerate() {
        let base = index * 16;
        buf[base..base + 3].copy_from_slice(&slot.config);
        buf[base + 8..base + 10].copy_from_slice(&slot.type_id.to_le_bytes());
        buf[base + 10..base + 12].copy_from_slice(&slot.telemetry.frame_id.to_le_bytes());
        buf[base + 12] = 8;
        buf[base + 13] = slot.telemetry.dlc;
        buf[base + 14] = u8::from(slot.telemetry.persist);
    }
    buf[128..132].copy_from_slice(&model.node.get().to_le_bytes());
    buf[132..134].copy_from_slice(&IDENTITY_FRAME_ID.to_le_bytes());
    buf[134] = 8;
    buf[135] = model.slots.len() as u8;
    buf
}

/// Frames in the order the node sends them.
///
/// The last slot always sends Part A first: its Part B completes the
/// interview.
fn interview_frames(model: &NodeModel, reported: u16, honour_order: bool) -> Vec<Frame> {
    let intro = IdentityAnnouncement {
        node: model.node,
        submodule_count: model.slots.len() as u8,
        reported_checksum: reported,
    };
    let mut frames = vec![intro.encode(IDENTITY_FRAME_ID).unwrap()];

    let last = model.slots.len().saturating_sub(1);
    for (index, slot) in model.slots.iter().enumerate() {
        let report = |part| SubmoduleReport { node: model.node, index: index as u8, part };
        let a = report(SubmodulePart::Config(slot.config)).encode(slot.type_id).unwrap();
        let b = report(SubmodulePart::Telemetry(slot.telemetry)).encode(slot.type_id).unwrap();
        if honour_order && slot.b_first && index != last {
            frames.extend([b, a]);
        } else {
            frames.extend([a, b]);
        }
    }
    frames
}

fn run(frames: &[Frame]) -> (Master, usize) {
    let now = Instant::now();
    let mut master = Master::new(MasterConfig::default());
    let mut acks = 0;
    for frame in frames {
        let actions = master.handle_frame(frame, now).unwrap();
        acks += actions.iter().filter(|a| matches!(a, MasterAction::SendFrame(_))).count();
    }
    (master, acks)
}

proptest! {
    #[test]
    fn checksum_matches_reference_image(model in node_strategy()) {
        let (master, acks) = run(&interview_frames(&model, 0x0000, true));
        let record = master.node(model.node).unwrap();

        prop_assert!(record.interview_complete());
        prop_assert_eq!(acks, 1 + 2 * model.slots.len());
        prop_assert_eq!(record.computed_checksum(), Some(crc16_ccitt_false(&reference_image(&model))));
    }

    #[test]
    fn part_order_does_not_change_checksum(model in node_strategy()) {
        let (in_order, _) = run(&interview_frames(&model, 0x0000, false));
        let (shuffled, _) = run(&interview_frames(&model, 0x0000, true));

        let a = in_order.node(model.node).unwrap();
        let b = shuffled.node(model.node).unwrap();
        prop_assert_eq!(a.computed_checksum(), b.computed_checksum());
        prop_assert_eq!(a.submodules().count(), b.submodules().count());
        for ((_, x), (_, y)) in a.submodules().zip(b.submodules()) {
            prop_assert_eq!(x, y);
        }
    }

    #[test]
    fn reported_checksum_does_not_feed_the_record(model in node_strategy(), r1 in any::<u16>(), r2 in any::<u16>()) {
        let (first, _) = run(&interview_frames(&model, r1, true));
        let (second, _) = run(&interview_frames(&model, r2, true));

        prop_assert_eq!(
            first.node(model.node).unwrap().computed_checksum(),
            second.node(model.node).unwrap().computed_checksum()
        );
    }
}
