//! # Networker Errors

use shared_types::{NodeAlias, PoolError};
use thiserror::Error;

/// Failures of a node channel.
///
/// None of these fail a request directly: the send is logged and the node
/// ages out through its pending timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkerError {
    /// TCP connect or address resolution failed.
    #[error("Connect to {alias} failed: {reason}")]
    Connect {
        /// Target node
        alias: NodeAlias,
        /// Underlying error
        reason: String,
    },

    /// Sealing or opening a frame failed.
    #[error("Channel crypto failure: {0}")]
    Crypto(String),

    /// A frame length exceeds the allowed maximum.
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// The channel's background task is gone.
    #[error("Channel to {0} is closed")]
    ChannelClosed(NodeAlias),

    /// No async runtime to spawn the channel on.
    #[error("No runtime available: {0}")]
    Runtime(String),
}

impl From<NetworkerError> for PoolError {
    fn from(e: NetworkerError) -> Self {
        PoolError::Transport(e.to_string())
    }
}
