//! Human-readable output.

use std::io::{self, Write};

use fleetbus_core::{MasterEvent, MasterSnapshot, NodeSnapshot};

fn checksum(value: Option<u16>) -> String {
    value.map_or_else(|| "-".to_string(), |c| format!("{c:#06x}"))
}

pub fn write_snapshot(out: &mut impl Write, snapshot: &MasterSnapshot) -> io::Result<()> {
    writeln!(
        out,
        "{:<10} {:>4} {:>8} {:>8} {:<12} {:<12} {:<10}",
        "NODE", "SUBS", "REPORTED", "COMPUTED", "PHASE", "CHECKSUM", "PROVISION"
    )?;
    for node in &snapshot.nodes {
        write_node(out, node)?;
    }

    let stats = &snapshot.stats;
    writeln!(
        out,
        "{} nodes, {} frames, {} acks, {} dropped, {} send failures",
        snapshot.nodes.len(),
        stats.frames_handled,
        stats.acks_sent,
        stats.malformed + stats.unexpected_index + stats.unexpected_replies,
        stats.send_failures,
    )
}

fn write_node(out: &mut impl Write, node: &NodeSnapshot) -> io::Result<()> {
    writeln!(
        out,
        "{:<10} {:>4} {:>8} {:>8} {:<12} {:<12} {:<10}",
        node.id.to_string(),
        node.declared_count,
        checksum(node.reported_checksum),
        checksum(node.computed_checksum),
        format!("{:?}", node.phase),
        format!("{:?}", node.checksum_status),
        node.provisioning.to_string(),
    )?;
    for slot in &node.submodules {
        let sub = &slot.submodule;
        let config = sub.config.map_or_else(|| "-".to_string(), hex::encode);
        let telemetry = sub.telemetry.map_or_else(
            || "-".to_string(),
            |t| format!("{:#05x}/{}{}", t.frame_id, t.dlc, if t.persist { " persist" } else { "" }),
        );
        writeln!(
            out,
            "  [{}] type {:#05x} config {config} telemetry {telemetry}",
            slot.index, sub.intro_frame_id
        )?;
    }
    Ok(())
}

pub fn write_event(out: &mut impl Write, event: &MasterEvent) -> io::Result<()> {
    match event {
        MasterEvent::InterviewStarted { node, submodule_count } => {
            writeln!(out, "{node}: interview started, {submodule_count} submodules")
        },
        MasterEvent::InterviewComplete { node, computed, reported, status } => writeln!(
            out,
            "{node}: interview complete, computed {computed:#06x} reported {reported:#06x} ({status:?})"
        ),
        MasterEvent::ProvisioningChanged { node, state } => {
            writeln!(out, "{node}: provisioning {state}")
        },
    }
}
