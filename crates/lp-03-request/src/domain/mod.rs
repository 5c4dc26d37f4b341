//! # Domain Layer
//!
//! Ledger view, node wire messages, request events and outcomes.

pub mod errors;
pub mod events;
pub mod ledger_view;
pub mod messages;
pub mod outcome;

pub use errors::RequestError;
pub use events::RequestEvent;
pub use ledger_view::{decode_hash, encode_hash, LedgerView};
pub use messages::{
    stringify_req_id, Acknowledgement, CatchupReply, CatchupRequest, ConsistencyProof, LedgerStatus,
    Reply, WireMessage, POOL_LEDGER_ID,
};
pub use outcome::RequestOutcome;

/// 32-byte SHA-256 Merkle hash.
pub type Hash = [u8; 32];
