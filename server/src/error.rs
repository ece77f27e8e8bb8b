//! Error types surfaced by the server core
//!
//! Expected no-op outcomes (connecting an entity that is already online,
//! disconnecting one that is already offline) are plain `bool` returns and
//! never appear here. Everything in this module is a fault.

use crate::store::StoreError;
use crate::world::WorldError;
use shared::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A second synchronizer was bound without the first being reset
    #[error("network synchronizer may only be set once for a given player login")]
    SynchronizerAlreadyBound,

    /// Rejected before any state changed
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("session {0} is closed")]
    Closed(u32),

    #[error("outbound queue has shut down")]
    QueueClosed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("world placement failed: {0}")]
    World(#[from] WorldError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Failures that stop the server from starting or running
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec registry: {0}")]
    Codec(#[from] CodecError),

    #[error("player store: {0}")]
    Store(#[from] StoreError),
}
