//! Simulated fleet on the far end of a [`SimBus`](crate::SimBus).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fleetbus_proto::{MessageIds, NodeId, Telemetry};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{sim_bus::BusPeer, sim_node::SimNode};

/// A set of [`SimNode`]s sharing one bus.
///
/// Clones share the nodes, so a test can keep a clone to inspect node state
/// while the pump task owns another.
#[derive(Debug, Clone)]
pub struct SimFleet {
    ids: MessageIds,
    nodes: Arc<Mutex<Vec<SimNode>>>,
}

impl SimFleet {
    /// Fleet using the given arbitration id table.
    pub fn new(ids: MessageIds, nodes: Vec<SimNode>) -> Self {
        Self { ids, nodes: Arc::new(Mutex::new(nodes)) }
    }

    /// `count` never-configured nodes with sequential identities, each
    /// carrying `count % 4` submodules so interviews differ in length.
    pub fn generated(ids: MessageIds, count: usize) -> Self {
        let nodes = (0..count)
            .map(|i| {
                let id = NodeId::new(0x1000_0000 + i as u32);
                (0..(i % 4) as u16).fold(SimNode::new(id), |node, index| {
                    node.with_submodule(
                        0x701 + index,
                        [index as u8, 0x10, 0x20],
                        Telemetry {
                            frame_id: 0x500 + (i as u16) * 8 + index,
                            dlc: 8,
                            persist: index % 2 == 0,
                        },
                    )
                })
            })
            .collect();
        Self::new(ids, nodes)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SimNode>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of one node's current state.
    pub fn node(&self, id: NodeId) -> Option<SimNode> {
        self.lock().iter().find(|n| n.id() == id).cloned()
    }

    /// Identities of every node.
    pub fn ids(&self) -> Vec<NodeId> {
        self.lock().iter().map(SimNode::id).collect()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if the fleet has no nodes.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pump frames between the bus and the nodes until the master side
    /// closes.
    pub fn spawn(&self, mut peer: BusPeer) -> JoinHandle<()> {
        let fleet = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = peer.recv().await {
                let replies: Vec<_> = {
                    let mut nodes = fleet.lock();
                    nodes.iter_mut().flat_map(|node| node.handle(&fleet.ids, &frame)).collect()
                };
                for reply in replies {
                    peer.send(reply);
                }
            }
            debug!("simulated fleet stopped");
        })
    }
}
