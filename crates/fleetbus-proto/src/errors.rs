//! Protocol error types.

use thiserror::Error;

/// Result alias used throughout the wire layer.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while building or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Arbitration id does not fit the 11-bit standard identifier space.
    #[error("arbitration id {0:#x} exceeds the 11-bit standard range")]
    InvalidArbitrationId(u32),

    /// Interview band whose first id lies past its last.
    #[error("interview band {start:#x}..={end:#x} is empty")]
    EmptyInterviewBand {
        /// First id of the band
        start: u16,
        /// Last id of the band
        end: u16,
    },

    /// Single-purpose id that falls inside the interview band, so its frames
    /// would be read as interview traffic.
    #[error("arbitration id {0:#x} overlaps the interview band")]
    OverlapsInterviewBand(u16),

    /// Payload longer than a classic frame can carry.
    #[error("payload of {len} bytes exceeds the 8-byte frame limit")]
    PayloadTooLong {
        /// Length that was requested
        len: usize,
    },

    /// Payload shorter than the layout being decoded requires.
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        /// Minimum length for the layout
        expected: usize,
        /// Length actually present
        actual: usize,
    },

    /// Text that does not parse as a node identity.
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),
}
