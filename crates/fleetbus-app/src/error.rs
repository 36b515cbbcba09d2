//! Runtime errors.

use std::io;

use fleetbus_core::CommandError;
use thiserror::Error;

/// Errors surfaced by the runtime and its [`Handle`](crate::Handle).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The master refused the command; nothing was sent
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The command was applied but its frame could not be sent
    #[error("bus send failed: {0}")]
    Send(#[source] io::Error),

    /// Reading from the bus failed
    #[error("bus receive failed: {0}")]
    Receive(#[source] io::Error),

    /// The reader task panicked
    #[error("bus reader task failed: {0}")]
    Reader(String),
}
