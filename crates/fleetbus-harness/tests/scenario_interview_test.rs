//! Interview scenarios.
//!
//! Full discovery cycles between the master and simulated firmware on a
//! lossless bus, verified by oracles.

use fleetbus_core::{ChecksumStatus, InterviewPhase, MasterEvent};
use fleetbus_harness::{
    DEFAULT_IDENTITY_FRAME_ID, SimNode,
    scenario::{Scenario, Step},
};
use fleetbus_proto::{NodeId, Telemetry};

const ALPHA: NodeId = NodeId::new(0x25A5_6D84);
const BETA: NodeId = NodeId::new(0x0000_00B2);

fn telemetry(frame_id: u16) -> Telemetry {
    Telemetry { frame_id, dlc: 8, persist: false }
}

fn two_submodule_node(id: NodeId) -> SimNode {
    SimNode::new(id)
        .with_submodule(0x701, [0x00, 0x01, 0x07], telemetry(0x210))
        .with_submodule(0x705, [0x0A, 0x00, 0x00], telemetry(0x211))
}

#[test]
fn discovery_interviews_every_node() {
    Scenario::new("discovery interviews every node")
        .node(two_submodule_node(ALPHA))
        .node(SimNode::new(BETA))
        .step(Step::Discover)
        .oracle(Box::new(|world| {
            if !world.all_interviewed() {
                return Err("not every node finished its interview".into());
            }
            for sim in world.nodes() {
                let record = world.master().node(sim.id()).ok_or("node missing from registry")?;
                if record.computed_checksum() != Some(sim.config_checksum()) {
                    return Err(format!("checksum mismatch for {}", sim.id()));
                }
                if record.identity_frame_id() != Some(DEFAULT_IDENTITY_FRAME_ID) {
                    return Err(format!("identity frame id not recorded for {}", sim.id()));
                }
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn unconfigured_nodes_need_config() {
    Scenario::new("unconfigured nodes need config")
        .node(two_submodule_node(ALPHA))
        .step(Step::Discover)
        .oracle(Box::new(|world| {
            let snapshot = world.snapshot();
            let node = snapshot.node(ALPHA).ok_or("missing node")?;
            if node.checksum_status != ChecksumStatus::NeedsConfig {
                return Err(format!("expected NeedsConfig, got {:?}", node.checksum_status));
            }
            if node.submodules.len() != 2 {
                return Err(format!("expected 2 submodules, got {}", node.submodules.len()));
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn configured_node_matches_and_drifted_node_is_modified() {
    Scenario::new("match and drift")
        .node(two_submodule_node(ALPHA).configured())
        .node(two_submodule_node(BETA).with_boot_checksum(0x0BAD))
        .step(Step::Discover)
        .oracle(Box::new(|world| {
            let snapshot = world.snapshot();
            let alpha = snapshot.node(ALPHA).ok_or("missing alpha")?;
            let beta = snapshot.node(BETA).ok_or("missing beta")?;
            if alpha.checksum_status != ChecksumStatus::Match {
                return Err(format!("alpha: {:?}", alpha.checksum_status));
            }
            if beta.checksum_status != ChecksumStatus::Modified {
                return Err(format!("beta: {:?}", beta.checksum_status));
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn acks_match_interview_frames() {
    Scenario::new("one ack per interview frame")
        .node(two_submodule_node(ALPHA))
        .node(SimNode::new(BETA))
        .step(Step::Discover)
        .oracle(Box::new(|world| {
            // 1 identity + 2 parts per submodule, per node
            let expected = (1 + 2 * 2) + 1;
            let stats = world.master().stats();
            if stats.acks_sent != expected {
                return Err(format!("expected {expected} acks, got {}", stats.acks_sent));
            }
            if stats.malformed + stats.unexpected_index != 0 {
                return Err("clean bus produced dropped frames".into());
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn rediscovery_reinterviews_from_scratch() {
    Scenario::new("rediscovery")
        .node(two_submodule_node(ALPHA))
        .step(Step::Discover)
        .step(Step::Discover)
        .oracle(Box::new(|world| {
            let started = world
                .events()
                .iter()
                .filter(|e| matches!(e, MasterEvent::InterviewStarted { node, .. } if *node == ALPHA))
                .count();
            let completed = world
                .events()
                .iter()
                .filter(|e| matches!(e, MasterEvent::InterviewComplete { node, .. } if *node == ALPHA))
                .count();
            if (started, completed) != (2, 2) {
                return Err(format!("expected two full cycles, got {started}/{completed}"));
            }
            if world.master().stats().discovery_cycles != 2 {
                return Err("discovery not counted".into());
            }
            Ok(())
        }))
        .run()
        .unwrap();
}

#[test]
fn reassignment_forces_reinterview() {
    Scenario::new("reassignment")
        .node(two_submodule_node(ALPHA))
        .step(Step::Discover)
        .step(Step::Reassign { node: ALPHA, index: 1, type_id: 0x720, pin: 14 })
        .oracle(Box::new(|world| {
            let snapshot = world.snapshot();
            let node = snapshot.node(ALPHA).ok_or("missing node")?;
            if node.phase != InterviewPhase::AwaitingIdentity {
                return Err(format!("expected AwaitingIdentity, got {:?}", node.phase));
            }
            if node.reported_checksum.is_none() {
                return Err("reported checksum should survive".into());
            }
            Ok(())
        }))
        .run()
        .unwrap();
}
