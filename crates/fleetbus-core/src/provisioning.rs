//! Provisioning controller: commit, erase and the write handshake.
//!
//! # State Machine
//!
//! ```text
//!            commit           write-ack (+ reboot)
//!   Idle ───────────> Writing ────────────────────> Success
//!    │                 │  │
//!    │                 │  └── write-failed ───────> Failed
//!    │                 └───── timeout ────────────> TimedOut ── late ack/fail ──> Success/Failed
//!    └── erase ──> Erasing
//! ```
//!
//! Any state may be re-entered through commit or erase; retrying is how an
//! operator recovers from `Failed` or `TimedOut`. Provisioning state survives
//! discovery cycles.
//!
//! Functions here operate on one [`NodeRecord`] and return the frame to send.
//! Outbound frames are encoded before the record is touched, so an encoding
//! failure never leaves a node in `Writing` without a write on the bus.

use std::{
    fmt,
    time::{Duration, Instant},
};

use fleetbus_proto::{Command, Frame, MessageIds, ProvisioningReply};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{CommandError, FrameError},
    registry::NodeRecord,
};

/// Checksum the firmware reports when it has never been configured.
pub const UNCONFIGURED_CHECKSUM: u16 = 0xFFFF;

/// Where a node is in the provisioning handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningState {
    /// No command outstanding
    Idle,
    /// Write sent, waiting for ack
    Writing,
    /// Node persisted the configuration and was told to reboot
    Success,
    /// Node rejected the write
    Failed,
    /// No reply within the provisioning timeout
    TimedOut,
    /// Erase sent; the node re-interviews after reboot
    Erasing,
}

impl ProvisioningState {
    /// Whether a reply to a write is acceptable in this state.
    ///
    /// `TimedOut` still accepts one: a slow node that answers late is not
    /// treated as a protocol error.
    pub fn awaits_reply(self) -> bool {
        matches!(self, Self::Writing | Self::TimedOut)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Writing => "writing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::Erasing => "erasing",
        };
        f.write_str(label)
    }
}

/// Provisioning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// How long a node may stay in `Writing` before it times out
    pub timeout: Duration,
    /// Reported checksum meaning "never configured"
    pub unconfigured_checksum: u16,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(5), unconfigured_checksum: UNCONFIGURED_CHECKSUM }
    }
}

/// Start a configuration write.
///
/// Requires a finished interview and a computed checksum that differs from
/// the reported one, unless the node reported the unconfigured sentinel.
/// A commit while already `Writing` restarts the timeout.
pub fn commit(
    record: &mut NodeRecord,
    config: &ProvisioningConfig,
    ids: &MessageIds,
    now: Instant,
) -> Result<Frame, CommandError> {
    let node = record.id();
    let computed = match record.computed_checksum() {
        Some(checksum) if record.interview_complete() => checksum,
        _ => return Err(CommandError::InterviewIncomplete(node)),
    };

    let unconfigured = record.reported_checksum() == Some(config.unconfigured_checksum);
    if record.reported_checksum() == Some(computed) && !unconfigured {
        return Err(CommandError::NothingToCommit { node, checksum: computed });
    }

    let frame = Command::WriteConfig { node, checksum: computed }.encode(ids)?;

    record.provisioning = ProvisioningState::Writing;
    record.provisioning_started_at = Some(now);
    info!(%node, checksum = format_args!("{computed:#06x}"), "config write sent");

    Ok(frame)
}

/// Wipe the node's persisted configuration and force a re-interview.
pub fn erase(record: &mut NodeRecord, ids: &MessageIds, now: Instant) -> Result<Frame, CommandError> {
    let node = record.id();
    let frame = Command::EraseConfig(node).encode(ids)?;

    record.reset_interview();
    record.provisioning = ProvisioningState::Erasing;
    record.provisioning_started_at = Some(now);
    info!(%node, "config erase sent");

    Ok(frame)
}

/// Apply a write-ack or write-failed reply.
///
/// Returns the command to send in response: a successful write is followed
/// by a reboot so the new configuration takes effect.
pub fn handle_reply(
    record: &mut NodeRecord,
    reply: ProvisioningReply,
) -> Result<Option<Command>, FrameError> {
    let node = record.id();
    let state = record.provisioning;
    if !state.awaits_reply() {
        return Err(FrameError::UnexpectedReply { node, state });
    }

    match reply {
        ProvisioningReply::Committed(_) => {
            record.provisioning = ProvisioningState::Success;
            info!(%node, "config write acknowledged, rebooting node");
            Ok(Some(Command::Reboot(node)))
        },
        ProvisioningReply::Failed(_) => {
            record.provisioning = ProvisioningState::Failed;
            warn!(%node, "config write failed");
            Ok(None)
        },
    }
}

/// Move a node stuck in `Writing` past the timeout to `TimedOut`.
///
/// Returns true if the state changed.
pub fn check_timeout(record: &mut NodeRecord, config: &ProvisioningConfig, now: Instant) -> bool {
    if record.provisioning != ProvisioningState::Writing {
        return false;
    }

    let Some(started) = record.provisioning_started_at else {
        return false;
    };

    let elapsed = now.saturating_duration_since(started);
    if elapsed <= config.timeout {
        return false;
    }

    record.provisioning = ProvisioningState::TimedOut;
    warn!(node = %record.id(), ?elapsed, "config write timed out");
    true
}
