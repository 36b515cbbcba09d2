//! Fuzz every inbound and outbound decoder with arbitrary frames.
//!
//! Decoders must never panic, and anything that decodes as a command must
//! encode back onto the same arbitration id.

#![no_main]

use fleetbus_proto::{
    Command, Frame, IdentityAnnouncement, MessageIds, ProvisioningReply, SubmoduleReport,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((id, payload)) = data.split_first_chunk::<2>() else {
        return;
    };
    let raw = u32::from(u16::from_le_bytes(*id));
    let Ok(frame) = Frame::from_raw(raw, payload) else {
        return;
    };

    let ids = MessageIds::default();
    let _ = IdentityAnnouncement::decode(&frame);
    let _ = SubmoduleReport::decode(&frame);

    if let Ok(Some(reply)) = ProvisioningReply::decode(&ids, &frame) {
        let encoded = reply.encode(&ids).expect("decoded reply must re-encode");
        assert_eq!(encoded.id(), frame.id());
    }
    if let Ok(Some(command)) = Command::decode(&ids, &frame) {
        let encoded = command.encode(&ids).expect("decoded command must re-encode");
        assert_eq!(encoded.id(), frame.id());
    }
});
