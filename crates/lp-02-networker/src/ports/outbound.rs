//! # Driven Ports (Outbound SPI)
//!
//! Connection pools never touch sockets. They ask a `NodeConnector` for a
//! channel per node, write through it, and receive whatever the node sends
//! back as `InboundFrame`s on the pool loop's channel.

use shared_types::{ConnectionId, RemoteNode};
use tokio::sync::mpsc;

use crate::domain::{ClientSecret, NetworkerError};

/// A decrypted message from a node, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Pool that owns the channel.
    pub pool_id: ConnectionId,
    /// Index of the node in that pool's ordering.
    pub node_index: usize,
    /// Message text.
    pub payload: String,
}

/// Everything a connector needs to open one node channel.
pub struct NodeLink<'a> {
    /// Pool the channel belongs to.
    pub pool_id: ConnectionId,
    /// Position of the node in the pool.
    pub node_index: usize,
    /// Target node.
    pub node: &'a RemoteNode,
    /// The pool's own key.
    pub client_secret: &'a ClientSecret,
    /// Where received frames go.
    pub inbound: mpsc::Sender<InboundFrame>,
}

/// Write half of an open node channel.
///
/// Writes are fire-and-forget: `Ok` means the message was queued.
pub trait NodeChannel: Send {
    /// Queue `message` for the node.
    fn send(&mut self, message: &str) -> Result<(), NetworkerError>;
}

/// Opens node channels.
pub trait NodeConnector: Send + Sync {
    /// Open a channel. Must not block; connection work happens in the
    /// background.
    fn connect(&self, link: NodeLink<'_>) -> Result<Box<dyn NodeChannel>, NetworkerError>;
}
