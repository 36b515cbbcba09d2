//! Operator command surface.

use std::sync::Arc;

use fleetbus_core::{
    BusTransport, CommandError, Environment, MasterAction, MasterEvent, MasterSnapshot, Stats,
};
use fleetbus_proto::NodeId;
use tokio::sync::broadcast;

use crate::{error::RuntimeError, runtime::Shared};

/// Cloneable handle for issuing commands and reading state.
///
/// Commands lock the master only long enough to compute their frames; the
/// sends happen after the lock is released.
pub struct Handle<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Handle<T, E> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: BusTransport, E: Environment> Handle<T, E> {
    pub(crate) fn new(shared: Arc<Shared<T, E>>) -> Self {
        Self { shared }
    }

    /// Point-in-time view of every node.
    pub fn snapshot(&self) -> MasterSnapshot {
        let now = self.shared.env.now();
        self.shared.master().snapshot(now)
    }

    /// Current counters.
    pub fn stats(&self) -> Stats {
        self.shared.master().stats()
    }

    /// Subscribe to master events.
    pub fn subscribe(&self) -> broadcast::Receiver<MasterEvent> {
        self.shared.events.subscribe()
    }

    /// Reset every interview and broadcast discovery.
    pub async fn trigger_discovery(&self) -> Result<(), RuntimeError> {
        let actions = self.shared.master().trigger_discovery();
        self.dispatch(actions).await
    }

    /// Persist the reconstructed configuration on `node`.
    pub async fn commit(&self, node: NodeId) -> Result<(), RuntimeError> {
        let now = self.shared.env.now();
        let actions = self.shared.master().commit(node, now);
        self.dispatch(actions).await
    }

    /// Commit every node that qualifies.
    ///
    /// Returns the refusals for the nodes that were skipped. Frames for the
    /// committed nodes are sent before returning.
    pub async fn commit_all(&self) -> Result<Vec<CommandError>, RuntimeError> {
        let now = self.shared.env.now();
        let (actions, refused) = self.shared.master().commit_all(now);
        self.dispatch(Ok(actions)).await?;
        Ok(refused)
    }

    /// Wipe `node`'s persisted configuration.
    pub async fn erase(&self, node: NodeId) -> Result<(), RuntimeError> {
        let now = self.shared.env.now();
        let actions = self.shared.master().erase(node, now);
        self.dispatch(actions).await
    }

    /// Restart `node`.
    pub async fn reboot(&self, node: NodeId) -> Result<(), RuntimeError> {
        let actions = self.shared.master().reboot(node);
        self.dispatch(actions).await
    }

    /// Send `node ++ extra` on `arbitration_id`.
    pub async fn raw_command(
        &self,
        node: NodeId,
        arbitration_id: u16,
        extra: &[u8],
    ) -> Result<(), RuntimeError> {
        let actions = self.shared.master().raw_command(node, arbitration_id, extra);
        self.dispatch(actions).await
    }

    /// Move submodule `index` of `node` to hardware type `type_id` on `pin`.
    pub async fn reassign_submodule(
        &self,
        node: NodeId,
        index: u8,
        type_id: u16,
        pin: u8,
    ) -> Result<(), RuntimeError> {
        let actions = self.shared.master().reassign_submodule(node, index, type_id, pin);
        self.dispatch(actions).await
    }

    async fn dispatch(
        &self,
        actions: Result<Vec<MasterAction>, CommandError>,
    ) -> Result<(), RuntimeError> {
        self.shared.execute(actions?).await.map_err(RuntimeError::Send)
    }
}
