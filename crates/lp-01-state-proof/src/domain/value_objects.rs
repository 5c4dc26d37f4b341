//! # Value Objects
//!
//! Immutable values produced from one reply and consumed once by the
//! verifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ProofError;

/// Multi-signature over a state root, as carried in `state_proof`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSignature {
    /// Aliases of the nodes whose signatures were aggregated.
    pub participants: Vec<String>,
    /// Aggregated BLS signature, base58.
    pub signature: String,
    /// Signed structure, kept verbatim so the signed bytes can be rebuilt.
    pub value: Value,
}

impl MultiSignature {
    /// `value.state_root_hash`.
    pub fn state_root_hash(&self) -> Option<&str> {
        self.value.get("state_root_hash").and_then(Value::as_str)
    }

    /// `value.timestamp`, seconds since the epoch.
    pub fn timestamp(&self) -> Option<u64> {
        self.value.get("timestamp").and_then(Value::as_u64)
    }

    /// Bytes the signers signed: MessagePack of `value`.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, ProofError> {
        rmp_serde::to_vec(&self.value).map_err(|e| ProofError::Encoding(e.to_string()))
    }

    /// Decoded aggregate signature bytes.
    pub fn signature_bytes(&self) -> Result<Vec<u8>, ProofError> {
        bs58::decode(&self.signature)
            .into_vec()
            .map_err(|e| ProofError::Encoding(format!("signature is not base58: {e}")))
    }
}

/// What a proof must show about the trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValuesToVerify {
    /// Each key maps to the value (or is absent when `None`).
    Simple(Vec<(Vec<u8>, Option<String>)>),
    /// Keys `prefix + n` for numeric `n` in `[from, to)` hold exactly these values.
    NumericalSuffix {
        /// Shared key prefix.
        prefix: Vec<u8>,
        /// Lowest suffix, inclusive.
        from: u64,
        /// Highest suffix, exclusive.
        to: u64,
        /// Expected `(suffix, value)` pairs.
        values: Vec<(u64, String)>,
    },
}

/// One state proof extracted from a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct StateProof {
    /// Base64 RLP list of trie nodes.
    pub proof_nodes: String,
    /// Base58 trie root.
    pub root_hash: String,
    /// Signature over the root.
    pub multi_signature: MultiSignature,
    /// Claims to check against the trie.
    pub kvs_to_verify: KeyValuesToVerify,
}

impl StateProof {
    /// Parse `state_proof` from a reply result with the given claims.
    pub fn from_json(state_proof: &Value, kvs_to_verify: KeyValuesToVerify) -> Result<Self, ProofError> {
        if state_proof.is_null() {
            return Err(ProofError::MissingProof);
        }
        let field = |name: &str| {
            state_proof
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ProofError::InvalidReply(format!("state_proof.{name} missing")))
        };
        let multi_signature = state_proof
            .get("multi_signature")
            .cloned()
            .ok_or_else(|| ProofError::InvalidReply("state_proof.multi_signature missing".into()))
            .and_then(|v| {
                serde_json::from_value::<MultiSignature>(v)
                    .map_err(|e| ProofError::InvalidReply(format!("multi_signature: {e}")))
            })?;

        Ok(Self {
            proof_nodes: field("proof_nodes")?,
            root_hash: field("root_hash")?,
            multi_signature,
            kvs_to_verify,
        })
    }
}

/// Generator of G2 the validators' BLS keys were derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlsGenerator(Vec<u8>);

impl BlsGenerator {
    /// Wrap a compressed (96 bytes) or serialized (192 bytes) G2 point.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ProofError> {
        match bytes.len() {
            96 | 192 => Ok(Self(bytes)),
            other => Err(ProofError::Encoding(format!(
                "generator must be 96 or 192 bytes, got {other}"
            ))),
        }
    }

    /// Decode a base58 generator.
    pub fn from_base58(encoded: &str) -> Result<Self, ProofError> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| ProofError::Encoding(format!("generator is not base58: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Point bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for BlsGenerator {
    /// The standard BLS12-381 G2 generator.
    fn default() -> Self {
        Self(crate::algorithms::multi_signature::standard_generator().to_vec())
    }
}
