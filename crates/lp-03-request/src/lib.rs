//! # LP-03 Request
//!
//! One state machine per request, from the first send to a trusted answer.
//!
//! **Subsystem ID:** 03
//! **Architecture:** Hexagonal (domain / algorithms / application)
//!
//! ## Role in System
//!
//! The pool loop feeds a machine its start event, then every node message
//! and timeout addressed to its request. The machine answers with
//! `NetworkCommand`s for the networker and, once finished, an outcome.
//!
//! ```text
//! [Pool loop] ──RequestEvent──→ [RequestStateMachine] ──NetworkCommand──→ [Router]
//!                                   │ ReplyVerifier (lp-01)
//!                                   ↓
//!                             RequestOutcome
//! ```
//!
//! The pool ledger catch-up rides on the same machine: target agreement
//! (`CatchupConsensus`) and transaction fetch (`CatchupSingle`) both grow a
//! [`LedgerView`], the client's RFC 6962 copy of the pool ledger.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod application;
pub mod domain;

pub use algorithms::{max_failed_nodes, CatchupTarget};
pub use application::{
    RequestContext, RequestState, RequestStateMachine, RequestTransition, DEFAULT_ACK_TIMEOUT,
    DEFAULT_PROTOCOL_VERSION, DEFAULT_REPLY_TIMEOUT,
};
pub use domain::{
    decode_hash, encode_hash, Hash, LedgerView, RequestError, RequestEvent, RequestOutcome,
    WireMessage,
};
