//! # Inbound Ports
//!
//! What a request needs from proof verification.

use serde_json::Value;

/// Decides whether a single node's reply can be trusted on its own.
pub trait ReplyVerifier: Send + Sync {
    /// `true` when every state proof in `result` verifies at `now` (unix
    /// seconds) for the value stored under `sp_key`.
    fn verify_reply(&self, txn_type: &str, sp_key: &[u8], result: &Value, now: u64) -> bool;
}
