//! Per-node interview state machine.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────────┐ identity  ┌──────────────┐ Part B of   ┌──────────┐
//! │ AwaitingIdentity │──────────>│ Interviewing │────────────>│ Complete │
//! └──────────────────┘           └──────────────┘ last index  └──────────┘
//!          │                                                       ^
//!          └──────────────── identity with count 0 ────────────────┘
//! ```
//!
//! The firmware sends one interview frame, then blocks until the core
//! acknowledges it. Every frame accepted before completion is therefore
//! acknowledged exactly once; frames that are dropped are not, which stalls
//! that node until it retransmits or a new discovery cycle starts.
//!
//! Part A (config) and Part B (telemetry) for an index may arrive in either
//! order. Completion is keyed off the Part B of index `count - 1`; there is
//! no gap detection, so a lower index that never arrived is simply absent
//! from the checksum.

use fleetbus_proto::{Frame, IdentityAnnouncement, NodeId, SubmodulePart, SubmoduleReport};
use tracing::{debug, trace};

use crate::{
    config_record::ConfigRecord,
    error::FrameError,
    registry::{InterviewPhase, MAX_SUBMODULES, NodeRecord},
};

/// Result of feeding one interview-band frame to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewStep {
    /// Interview already complete this cycle; frame ignored
    AlreadyComplete,

    /// Identity frame accepted
    Identity {
        /// Submodules the node will describe
        submodule_count: u8,
        /// Set when the node declared no submodules
        completed: bool,
    },

    /// Submodule half recorded
    Submodule {
        /// Slot index
        index: u8,
        /// Which half arrived
        part_b: bool,
        /// Set when this frame completed the interview
        completed: bool,
    },
}

impl InterviewStep {
    /// Whether the firmware is waiting for an acknowledgement of this frame.
    pub fn needs_ack(&self) -> bool {
        !matches!(self, Self::AlreadyComplete)
    }

    /// Whether this frame finished the interview.
    pub fn completed(&self) -> bool {
        match self {
            Self::AlreadyComplete => false,
            Self::Identity { completed, .. } | Self::Submodule { completed, .. } => *completed,
        }
    }
}

/// Feed one interview-band frame to `record`.
///
/// `record` must belong to the identity carried in the frame. On error the
/// record is left untouched (apart from `last_seen`, which the caller owns).
pub fn handle_frame(record: &mut NodeRecord, frame: &Frame) -> Result<InterviewStep, FrameError> {
    match record.phase() {
        InterviewPhase::Complete => Ok(InterviewStep::AlreadyComplete),
        InterviewPhase::AwaitingIdentity => handle_identity(record, frame),
        InterviewPhase::Interviewing => handle_submodule(record, frame),
    }
}

fn handle_identity(record: &mut NodeRecord, frame: &Frame) -> Result<InterviewStep, FrameError> {
    let intro =
        IdentityAnnouncement::decode(frame).map_err(|e| FrameError::malformed(frame.id(), e))?;

    if intro.submodule_count as usize > MAX_SUBMODULES {
        return Err(FrameError::TooManySubmodules {
            node: intro.node,
            declared: intro.submodule_count,
        });
    }

    record.identity_frame_id = Some(frame.id());
    record.declared_count = intro.submodule_count;
    record.reported_checksum = Some(intro.reported_checksum);

    debug!(
        node = %intro.node,
        submodules = intro.submodule_count,
        reported = format_args!("{:#06x}", intro.reported_checksum),
        "interview started"
    );

    let completed = intro.submodule_count == 0;
    if completed {
        complete(record);
    }

    Ok(InterviewStep::Identity { submodule_count: intro.submodule_count, completed })
}

fn handle_submodule(record: &mut NodeRecord, frame: &Frame) -> Result<InterviewStep, FrameError> {
    let report =
        SubmoduleReport::decode(frame).map_err(|e| FrameError::malformed(frame.id(), e))?;

    let declared = record.declared_count;
    if report.index >= declared {
        return Err(unexpected_index(report.node, report.index, declared));
    }

    let slot = record
        .slot_mut(report.index, frame.id())
        .ok_or_else(|| unexpected_index(report.node, report.index, declared))?;

    let part_b = match report.part {
        SubmodulePart::Config(config) => {
            slot.config = Some(config);
            // Part A's id is authoritative; Part B may have arrived first
            slot.intro_frame_id = frame.id();
            false
        },
        SubmodulePart::Telemetry(telemetry) => {
            slot.telemetry = Some(telemetry);
            true
        },
    };

    trace!(node = %report.node, index = report.index, part_b, "submodule recorded");

    let completed = part_b && report.index + 1 >= declared;
    if completed {
        complete(record);
    }

    Ok(InterviewStep::Submodule { index: report.index, part_b, completed })
}

fn unexpected_index(node: NodeId, index: u8, declared: u8) -> FrameError {
    FrameError::UnexpectedIndex { node, index, declared }
}

/// Mark the interview complete and compute the record checksum.
fn complete(record: &mut NodeRecord) {
    let image = ConfigRecord::from_node(record);
    let checksum = image.checksum();

    record.interview_complete = true;
    record.computed_checksum = Some(checksum);

    for row in image.hex_rows() {
        trace!(node = %record.id(), "{row}");
    }
}
