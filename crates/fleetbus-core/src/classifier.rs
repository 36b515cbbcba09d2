//! Inbound frame routing.
//!
//! Pure function of the arbitration id table and one frame. No state is
//! touched here; the master acts on the returned [`Route`].

use fleetbus_proto::{Frame, MessageIds, NodeId, ProvisioningReply};

use crate::error::FrameError;

/// Where an inbound frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Interview band frame from the given node
    Interview(NodeId),
    /// Reply to a configuration write
    Provisioning(ProvisioningReply),
    /// Not addressed to the core
    Ignored,
}

/// Route one frame.
///
/// Interview-band frames must carry at least the 4-byte identity; reply
/// frames likewise. Anything shorter is [`FrameError::Malformed`].
pub fn classify(ids: &MessageIds, frame: &Frame) -> Result<Route, FrameError> {
    let id = frame.id();

    if ids.is_interview(id) {
        let node = NodeId::from_payload(frame.data()).map_err(|e| FrameError::malformed(id, e))?;
        return Ok(Route::Interview(node));
    }

    match ProvisioningReply::decode(ids, frame) {
        Ok(Some(reply)) => Ok(Route::Provisioning(reply)),
        Ok(None) => Ok(Route::Ignored),
        Err(e) => Err(FrameError::malformed(id, e)),
    }
}
