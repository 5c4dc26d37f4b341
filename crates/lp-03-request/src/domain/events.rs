//! # Request Events
//!
//! Inputs of a request state machine: the start event that picks its kind,
//! then node traffic and timeouts.

use shared_types::{NodeAlias, RequestId};

use super::errors::RequestError;
use super::ledger_view::LedgerView;
use super::messages::{
    Acknowledgement, CatchupReply, ConsistencyProof, LedgerStatus, WireMessage,
};
use super::Hash;

/// Event fed to a request state machine.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    /// Start a catch-up target round from the local ledger.
    LedgerStatus {
        /// Local ledger
        view: LedgerView,
    },
    /// Start fetching missing transactions up to a known target.
    CatchupRequired {
        /// Local ledger
        view: LedgerView,
        /// Agreed target root
        target_root: Hash,
        /// Agreed target size
        target_size: usize,
    },
    /// Start a request answered by one trusted reply or by a quorum.
    CustomSingle {
        /// Serialized request
        message: String,
        /// Operation type code
        txn_type: String,
        /// State key the reply's proof must cover
        sp_key: Option<Vec<u8>>,
    },
    /// Start a request answered by a quorum of identical replies.
    CustomConsensus {
        /// Serialized request
        message: String,
    },
    /// Start a request whose answer is every target's raw reply.
    CustomFull {
        /// Serialized request
        message: String,
        /// Target aliases; every node when `None`
        nodes: Option<Vec<NodeAlias>>,
    },

    /// `LEDGER_STATUS` from a node.
    NodeLedgerStatus {
        /// Sender
        alias: NodeAlias,
        /// Announced ledger
        status: LedgerStatus,
    },
    /// `CONSISTENCY_PROOF` from a node.
    ConsistencyProof {
        /// Sender
        alias: NodeAlias,
        /// Proof toward the node's ledger
        proof: ConsistencyProof,
    },
    /// `CATCHUP_REPLY` from a node.
    CatchupReply {
        /// Sender
        alias: NodeAlias,
        /// Transactions and proof
        reply: CatchupReply,
    },
    /// `REPLY` from a node.
    Reply {
        /// Sender
        alias: NodeAlias,
        /// Routed request
        req_id: RequestId,
        /// Message text as received
        raw: String,
    },
    /// `REQACK` from a node.
    Reqack {
        /// Sender
        alias: NodeAlias,
        /// Routed request
        req_id: RequestId,
    },
    /// `REQNACK` from a node.
    Reqnack {
        /// Sender
        alias: NodeAlias,
        /// Routed request
        req_id: RequestId,
        /// Refusal reason
        reason: String,
        /// Message text as received
        raw: String,
    },
    /// `REJECT` from a node.
    Reject {
        /// Sender
        alias: NodeAlias,
        /// Routed request
        req_id: RequestId,
        /// Rejection reason
        reason: String,
        /// Message text as received
        raw: String,
    },
    /// A node's deadline passed.
    Timeout {
        /// Silent node
        alias: NodeAlias,
    },
    /// Cut the request short.
    Terminate,
}

impl RequestEvent {
    /// Decode a raw node message into the event it feeds.
    pub fn from_node_message(alias: &str, raw: &str) -> Result<Self, RequestError> {
        let alias = alias.to_string();
        let event = match WireMessage::parse(raw)? {
            WireMessage::LedgerStatus(status) => Self::NodeLedgerStatus { alias, status },
            WireMessage::ConsistencyProof(proof) => Self::ConsistencyProof { alias, proof },
            WireMessage::CatchupReply(reply) => Self::CatchupReply { alias, reply },
            WireMessage::Reply(reply) => Self::Reply {
                alias,
                req_id: reply.req_id().ok_or(RequestError::MissingField("result.reqId"))?,
                raw: raw.to_string(),
            },
            WireMessage::Reqack(ack) => Self::Reqack {
                alias,
                req_id: routed_req_id(&ack)?,
            },
            WireMessage::Reqnack(ack) => Self::Reqnack {
                alias,
                req_id: routed_req_id(&ack)?,
                reason: ack.reason.unwrap_or_default(),
                raw: raw.to_string(),
            },
            WireMessage::Reject(ack) => Self::Reject {
                alias,
                req_id: routed_req_id(&ack)?,
                reason: ack.reason.unwrap_or_default(),
                raw: raw.to_string(),
            },
            WireMessage::CatchupRequest(_) => {
                return Err(RequestError::Malformed("CATCHUP_REQUEST is client-to-node only".into()))
            }
        };
        Ok(event)
    }

    /// Request this event belongs to, when it is carried on the wire.
    ///
    /// Ledger status, consistency proofs and catch-up replies carry none and
    /// belong to the pool's catch-up request.
    pub fn req_id(&self) -> Option<&str> {
        match self {
            Self::Reply { req_id, .. }
            | Self::Reqack { req_id, .. }
            | Self::Reqnack { req_id, .. }
            | Self::Reject { req_id, .. } => Some(req_id),
            _ => None,
        }
    }

    /// Sending node, for node traffic.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::NodeLedgerStatus { alias, .. }
            | Self::ConsistencyProof { alias, .. }
            | Self::CatchupReply { alias, .. }
            | Self::Reply { alias, .. }
            | Self::Reqack { alias, .. }
            | Self::Reqnack { alias, .. }
            | Self::Reject { alias, .. }
            | Self::Timeout { alias } => Some(alias),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LedgerStatus { .. } => "LedgerStatus",
            Self::CatchupRequired { .. } => "CatchupRequired",
            Self::CustomSingle { .. } => "CustomSingle",
            Self::CustomConsensus { .. } => "CustomConsensus",
            Self::CustomFull { .. } => "CustomFull",
            Self::NodeLedgerStatus { .. } => "NodeLedgerStatus",
            Self::ConsistencyProof { .. } => "ConsistencyProof",
            Self::CatchupReply { .. } => "CatchupReply",
            Self::Reply { .. } => "Reply",
            Self::Reqack { .. } => "Reqack",
            Self::Reqnack { .. } => "Reqnack",
            Self::Reject { .. } => "Reject",
            Self::Timeout { .. } => "Timeout",
            Self::Terminate => "Terminate",
        }
    }
}

fn routed_req_id(ack: &Acknowledgement) -> Result<RequestId, RequestError> {
    ack.req_id().ok_or(RequestError::MissingField("reqId"))
}
