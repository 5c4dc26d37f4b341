//! # Algorithms
//!
//! - `merkle`: RFC 6962 roots and consistency proofs
//! - `consensus`: Byzantine threshold and reply tally
//! - `catchup`: target agreement and catch-up reply application

pub mod catchup;
pub mod consensus;
pub mod merkle;

pub use catchup::{
    apply_catchup_reply, catchup_request_message, evaluate_target, ledger_status_message,
    CatchupProgress, CatchupTarget, TargetVerdict,
};
pub use consensus::{canonical_reply, max_failed_nodes, ReplyTally};
pub use merkle::verify_consistency;
