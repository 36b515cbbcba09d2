//! Bus master: the one owner of the node registry.
//!
//! [`Master`] ties the classifier, interview machine and provisioning
//! controller together behind a small command surface. Like every state
//! machine in this crate it performs no I/O: each call takes the current time
//! and returns the [`MasterAction`]s the driver must execute, in order.
//!
//! # Flow Control
//!
//! Interview frames are acknowledged from inside [`Master::handle_frame`], so
//! the ack for frame N is always queued before frame N+1 can be processed.
//! Drivers must execute `SendFrame` actions in the order returned.

use std::time::Instant;

use fleetbus_proto::{Command, Frame, MessageIds, NodeId, ProvisioningReply};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    classifier::{self, Route},
    error::{CommandError, FrameError},
    interview::{self, InterviewStep},
    provisioning::{self, ProvisioningConfig, ProvisioningState},
    registry::{ChecksumStatus, MAX_SUBMODULES, NodeRecord, Registry},
    snapshot::MasterSnapshot,
};

/// Most extra bytes a raw command may carry after the identity.
pub const MAX_RAW_EXTRA: usize = 4;

/// Master configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Arbitration id table
    pub ids: MessageIds,
    /// Provisioning timeout and sentinel
    pub provisioning: ProvisioningConfig,
}

/// Actions returned by the master.
///
/// The driver (runtime or simulation harness) executes these:
/// - `SendFrame`: put the frame on the bus, fire-and-forget
/// - `Emit`: publish the event to collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterAction {
    /// Send this frame on the bus
    SendFrame(Frame),

    /// Publish this event
    Emit(MasterEvent),
}

/// Notifications for collaborators that do not want to poll snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterEvent {
    /// Identity frame accepted, interview running
    InterviewStarted {
        /// Node being interviewed
        node: NodeId,
        /// Submodules it declared
        submodule_count: u8,
    },

    /// Interview finished and the config record checksum is known
    InterviewComplete {
        /// Interviewed node
        node: NodeId,
        /// Checksum of the reconstructed record
        computed: u16,
        /// Checksum the node computed at boot
        reported: u16,
        /// Verdict
        status: ChecksumStatus,
    },

    /// Provisioning state changed
    ProvisioningChanged {
        /// Affected node
        node: NodeId,
        /// New state
        state: ProvisioningState,
    },
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Inbound frames passed to the master
    pub frames_handled: u64,
    /// Interview acknowledgements queued
    pub acks_sent: u64,
    /// Frames dropped as too short or undecodable
    pub malformed: u64,
    /// Frames dropped for an out-of-range submodule index or count
    pub unexpected_index: u64,
    /// Provisioning replies that matched no outstanding write
    pub unexpected_replies: u64,
    /// Frames not addressed to the core
    pub ignored: u64,
    /// Outbound frames the driver failed to send
    pub send_failures: u64,
    /// Interviews that reached completion
    pub interviews_completed: u64,
    /// Writes that timed out
    pub provisioning_timeouts: u64,
    /// Discovery broadcasts issued
    pub discovery_cycles: u64,
}

/// Bus master state machine.
#[derive(Debug, Clone)]
pub struct Master {
    config: MasterConfig,
    registry: Registry,
    stats: Stats,
}

impl Master {
    /// Master with an empty registry.
    pub fn new(config: MasterConfig) -> Self {
        Self { config, registry: Registry::new(), stats: Stats::default() }
    }

    /// Configuration
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Every node seen so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record for one node.
    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.registry.get(id)
    }

    /// Counters
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Checksum verdict for a node record under this master's sentinel.
    pub fn checksum_status(&self, record: &NodeRecord) -> ChecksumStatus {
        record.checksum_status(self.config.provisioning.unconfigured_checksum)
    }

    /// Process one inbound frame.
    ///
    /// An `Err` means the frame was dropped without changing interview or
    /// provisioning state and without an acknowledgement. Drops are already
    /// counted and logged; callers may ignore the error.
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: Instant,
    ) -> Result<Vec<MasterAction>, FrameError> {
        self.stats.frames_handled += 1;

        let result = match classifier::classify(&self.config.ids, frame) {
            Ok(Route::Interview(node)) => self.handle_interview(node, frame, now),
            Ok(Route::Provisioning(reply)) => self.handle_reply(reply, now),
            Ok(Route::Ignored) => {
                self.stats.ignored += 1;
                Ok(Vec::new())
            },
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.record_drop(e);
        }
        result
    }

    fn handle_interview(
        &mut self,
        node: NodeId,
        frame: &Frame,
        now: Instant,
    ) -> Result<Vec<MasterAction>, FrameError> {
        let unconfigured = self.config.provisioning.unconfigured_checksum;
        let (record, created) = self.registry.touch(node, now);
        if created {
            info!(%node, "node discovered");
        }

        let step = interview::handle_frame(record, frame)?;

        let mut events = Vec::new();
        if let InterviewStep::Identity { submodule_count, .. } = step {
            events.push(MasterEvent::InterviewStarted { node, submodule_count });
        }
        if step.completed() {
            let computed = record.computed_checksum().unwrap_or_default();
            let reported = record.reported_checksum().unwrap_or_default();
            let status = record.checksum_status(unconfigured);
            info!(
                %node,
                computed = format_args!("{computed:#06x}"),
                reported = format_args!("{reported:#06x}"),
                ?status,
                "interview complete"
            );
            events.push(MasterEvent::InterviewComplete { node, computed, reported, status });
        }

        let mut actions = Vec::with_capacity(events.len() + 1);
        if step.needs_ack() {
            if self.push_command(&mut actions, Command::Ack(node)) {
                self.stats.acks_sent += 1;
            }
        } else {
            debug!(%node, id = format_args!("{:#05x}", frame.id()), "interview already complete");
        }
        if step.completed() {
            self.stats.interviews_completed += 1;
        }
        actions.extend(events.into_iter().map(MasterAction::Emit));

        Ok(actions)
    }

    fn handle_reply(
        &mut self,
        reply: ProvisioningReply,
        now: Instant,
    ) -> Result<Vec<MasterAction>, FrameError> {
        let node = reply.node();
        let (record, created) = self.registry.touch(node, now);
        if created {
            info!(%node, "node discovered via provisioning reply");
        }

        let follow_up = provisioning::handle_reply(record, reply)?;
        let state = record.provisioning();

        let mut actions = Vec::new();
        if let Some(command) = follow_up {
            self.push_command(&mut actions, command);
        }
        actions.push(MasterAction::Emit(MasterEvent::ProvisioningChanged { node, state }));

        Ok(actions)
    }

    /// Periodic processing pass: times out stale writes.
    ///
    /// Must be called regularly even when the bus is silent.
    pub fn tick(&mut self, now: Instant) -> Vec<MasterAction> {
        let timeout = &self.config.provisioning;
        let mut actions = Vec::new();

        for record in self.registry.iter_mut() {
            if provisioning::check_timeout(record, timeout, now) {
                self.stats.provisioning_timeouts += 1;
                actions.push(MasterAction::Emit(MasterEvent::ProvisioningChanged {
                    node: record.id(),
                    state: record.provisioning(),
                }));
            }
        }

        actions
    }

    /// Start a new discovery cycle.
    ///
    /// Discards in-progress interview state for every node, then broadcasts
    /// discovery. Reported checksums and provisioning state are kept.
    pub fn trigger_discovery(&mut self) -> Result<Vec<MasterAction>, CommandError> {
        let frame = Command::Discover.encode(&self.config.ids)?;

        self.registry.reset_interviews();
        self.stats.discovery_cycles += 1;
        info!(nodes = self.registry.len(), "discovery triggered");

        Ok(vec![MasterAction::SendFrame(frame)])
    }

    /// Persist the reconstructed configuration on a node.
    pub fn commit(&mut self, node: NodeId, now: Instant) -> Result<Vec<MasterAction>, CommandError> {
        let record = self.registry.get_mut(node).ok_or(CommandError::UnknownNode(node))?;
        let frame =
            provisioning::commit(record, &self.config.provisioning, &self.config.ids, now)?;

        Ok(vec![
            MasterAction::SendFrame(frame),
            MasterAction::Emit(MasterEvent::ProvisioningChanged {
                node,
                state: ProvisioningState::Writing,
            }),
        ])
    }

    /// Commit every node that passes the commit rule.
    ///
    /// Nodes that do not qualify are skipped; their refusals are returned
    /// alongside the actions, in node order.
    pub fn commit_all(&mut self, now: Instant) -> (Vec<MasterAction>, Vec<CommandError>) {
        let nodes: Vec<NodeId> = self.registry.iter().map(NodeRecord::id).collect();
        let mut actions = Vec::new();
        let mut refused = Vec::new();
        let mut committed = 0usize;

        for node in nodes {
            match self.commit(node, now) {
                Ok(sent) => {
                    committed += 1;
                    actions.extend(sent);
                },
                Err(e) => {
                    debug!(%node, reason = %e, "skipped in batch commit");
                    refused.push(e);
                },
            }
        }

        info!(committed, skipped = refused.len(), "batch commit");
        (actions, refused)
    }

    /// Wipe a node's persisted configuration.
    pub fn erase(&mut self, node: NodeId, now: Instant) -> Result<Vec<MasterAction>, CommandError> {
        let record = self.registry.get_mut(node).ok_or(CommandError::UnknownNode(node))?;
        let frame = provisioning::erase(record, &self.config.ids, now)?;

        Ok(vec![
            MasterAction::SendFrame(frame),
            MasterAction::Emit(MasterEvent::ProvisioningChanged {
                node,
                state: ProvisioningState::Erasing,
            }),
        ])
    }

    /// Restart a node without changing its configuration.
    pub fn reboot(&mut self, node: NodeId) -> Result<Vec<MasterAction>, CommandError> {
        self.require_known(node)?;
        let frame = Command::Reboot(node).encode(&self.config.ids)?;
        info!(%node, "reboot sent");
        Ok(vec![MasterAction::SendFrame(frame)])
    }

    /// Send `identity ++ extra` on an arbitrary arbitration id.
    pub fn raw_command(
        &mut self,
        node: NodeId,
        arbitration_id: u16,
        extra: &[u8],
    ) -> Result<Vec<MasterAction>, CommandError> {
        self.require_known(node)?;
        if extra.len() > MAX_RAW_EXTRA {
            return Err(CommandError::ExtraTooLong(extra.len()));
        }

        let mut payload = [0u8; NodeId::WIRE_LEN + MAX_RAW_EXTRA];
        payload[..NodeId::WIRE_LEN].copy_from_slice(&node.to_be_bytes());
        payload[NodeId::WIRE_LEN..NodeId::WIRE_LEN + extra.len()].copy_from_slice(extra);
        let frame = Frame::new(arbitration_id, &payload[..NodeId::WIRE_LEN + extra.len()])?;

        debug!(%node, id = format_args!("{arbitration_id:#05x}"), "raw command sent");
        Ok(vec![MasterAction::SendFrame(frame)])
    }

    /// Move a submodule slot to a new hardware type and pin.
    ///
    /// The node applies the change itself, so its interview fields are
    /// dropped and the next discovery cycle re-interviews it.
    pub fn reassign_submodule(
        &mut self,
        node: NodeId,
        index: u8,
        type_id: u16,
        pin: u8,
    ) -> Result<Vec<MasterAction>, CommandError> {
        if index as usize >= MAX_SUBMODULES {
            return Err(CommandError::IndexOutOfRange(index));
        }
        let record = self.registry.get_mut(node).ok_or(CommandError::UnknownNode(node))?;

        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&node.to_be_bytes());
        payload[4] = index;
        payload[5] = pin;
        let frame = Frame::new(type_id, &payload)?;

        record.reset_interview();
        info!(%node, index, type_id = format_args!("{type_id:#05x}"), pin, "submodule reassigned");

        Ok(vec![MasterAction::SendFrame(frame)])
    }

    /// Count an outbound frame the driver could not send.
    ///
    /// The state transition that produced the frame stands.
    pub fn record_send_failure(&mut self) {
        self.stats.send_failures += 1;
    }

    /// Read-only view of every node.
    pub fn snapshot(&self, now: Instant) -> MasterSnapshot {
        MasterSnapshot::capture(self, now)
    }

    fn require_known(&self, node: NodeId) -> Result<(), CommandError> {
        if self.registry.get(node).is_some() { Ok(()) } else { Err(CommandError::UnknownNode(node)) }
    }

    /// Encode a frame-triggered command.
    ///
    /// These sends are fire-and-forget, so an encoding failure is counted and
    /// logged like a send failure rather than undoing the transition.
    fn push_command(&mut self, actions: &mut Vec<MasterAction>, command: Command) -> bool {
        match command.encode(&self.config.ids) {
            Ok(frame) => {
                actions.push(MasterAction::SendFrame(frame));
                true
            },
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(?command, error = %e, "cannot encode command");
                false
            },
        }
    }

    fn record_drop(&mut self, error: &FrameError) {
        match error {
            FrameError::Malformed { .. } => self.stats.malformed += 1,
            FrameError::TooManySubmodules { .. } | FrameError::UnexpectedIndex { .. } => {
                self.stats.unexpected_index += 1;
            },
            FrameError::UnexpectedReply { .. } => {
                self.stats.unexpected_replies += 1;
            },
        }
        debug!(%error, "frame dropped");
    }
}
