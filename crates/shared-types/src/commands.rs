//! # Network Commands
//!
//! What a request state machine asks of the networker. The machines never
//! touch sockets; they return these values and the pool loop routes them.

use std::time::Duration;

use crate::entities::{NodeAlias, RequestId};

/// Outbound instruction for the network router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Send to the first node of the pool.
    SendOne {
        /// Request id
        req_id: RequestId,
        /// Serialized message
        message: String,
        /// Deadline for the node's answer
        timeout: Duration,
    },
    /// Send to every node, or to the named subset.
    SendAll {
        /// Request id
        req_id: RequestId,
        /// Serialized message
        message: String,
        /// Deadline for each node's answer
        timeout: Duration,
        /// Optional target aliases
        nodes: Option<Vec<NodeAlias>>,
    },
    /// Re-send the last message of the request to the next node.
    Resend {
        /// Request id
        req_id: RequestId,
        /// Deadline for the next node's answer
        timeout: Duration,
    },
    /// Push a node's deadline forward (after REQACK).
    ExtendTimeout {
        /// Request id
        req_id: RequestId,
        /// Node whose deadline moves
        alias: NodeAlias,
        /// New deadline measured from now
        timeout: Duration,
    },
    /// Drop deadlines for one node, or for every node when `alias` is `None`.
    CleanTimeout {
        /// Request id
        req_id: RequestId,
        /// Node to clean, or all
        alias: Option<NodeAlias>,
    },
}

impl NetworkCommand {
    /// Request this command belongs to.
    pub fn req_id(&self) -> &RequestId {
        match self {
            NetworkCommand::SendOne { req_id, .. }
            | NetworkCommand::SendAll { req_id, .. }
            | NetworkCommand::Resend { req_id, .. }
            | NetworkCommand::ExtendTimeout { req_id, .. }
            | NetworkCommand::CleanTimeout { req_id, .. } => req_id,
        }
    }

    /// Whether this command starts a new request on a connection pool.
    pub fn opens_request(&self) -> bool {
        matches!(
            self,
            NetworkCommand::SendOne { .. } | NetworkCommand::SendAll { .. }
        )
    }
}
