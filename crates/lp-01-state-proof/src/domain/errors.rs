//! # Domain Errors
//!
//! Error types for state proof verification.

use thiserror::Error;

/// Why a state proof could not be trusted.
///
/// Every variant means the reply carrying the proof is discarded as
/// untrusted; none of them is fatal to the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    /// The reply carries no `state_proof`.
    #[error("Reply carries no state proof")]
    MissingProof,

    /// A hash reference points at a node the proof does not contain.
    #[error("Incomplete proof: node {0} not supplied")]
    IncompleteProof(String),

    /// A node does not have a valid trie shape or path flag.
    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    /// The walk did not terminate within the depth limit.
    #[error("Proof exceeds maximum depth {max}")]
    TooDeep {
        /// Depth limit
        max: usize,
    },

    /// Base64/base58/RLP decoding failed.
    #[error("Proof encoding error: {0}")]
    Encoding(String),

    /// Reply fields needed to compute the expected value are missing.
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// The signed state root differs from the proof root.
    #[error("Signed root {signed} does not match proof root {proof}")]
    RootMismatch {
        /// Root in `multi_signature.value`
        signed: String,
        /// Root in the proof
        proof: String,
    },

    /// The multi-signature is older than the freshness threshold.
    #[error("State proof is stale: signed at {signed_at}, now {now}")]
    Stale {
        /// Signing timestamp
        signed_at: u64,
        /// Verifier time
        now: u64,
    },

    /// The trie does not hold the expected value.
    #[error("Value for key does not match the proof")]
    ValueMismatch,

    /// Not enough participants or the pairing check failed.
    #[error("Multi-signature verification failed")]
    BadSignature,
}

impl From<rlp::DecoderError> for ProofError {
    fn from(e: rlp::DecoderError) -> Self {
        ProofError::Encoding(e.to_string())
    }
}
