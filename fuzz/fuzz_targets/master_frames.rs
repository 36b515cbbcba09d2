//! Fuzz the master with arbitrary frame sequences.
//!
//! Input is split into records of `[id_lo, id_hi, len, payload..8]`. Each
//! record becomes one frame delivered a few milliseconds after the last.
//! The master must never panic and its registry must stay consistent.

#![no_main]

use std::time::{Duration, Instant};

use fleetbus_core::{Master, MasterConfig};
use fleetbus_proto::Frame;
use libfuzzer_sys::fuzz_target;

const RECORD: usize = 11;

fuzz_target!(|data: &[u8]| {
    let mut master = Master::new(MasterConfig::default());
    let mut now = Instant::now();
    let mut delivered = 0u64;

    for record in data.chunks_exact(RECORD) {
        let id = u16::from_le_bytes([record[0], record[1]]) & Frame::MAX_STANDARD_ID;
        let len = usize::from(record[2]) % (Frame::MAX_DATA_LEN + 1);
        let frame = Frame::new(id, &record[3..3 + len]).expect("bounded frame");

        now += Duration::from_millis(u64::from(record[2] >> 4));
        let _ = master.handle_frame(&frame, now);
        let _ = master.tick(now);
        delivered += 1;
    }

    assert_eq!(master.stats().frames_handled, delivered);
    for record in master.registry().iter() {
        if record.interview_complete() {
            assert!(record.computed_checksum().is_some());
            assert!(record.identity_frame_id().is_some());
        }
        assert!(record.submodules().all(|(index, _)| index < record.declared_count()));
    }
});
