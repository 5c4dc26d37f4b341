//! # Domain Entities
//!
//! Identities of the validator nodes a pool talks to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Human-readable validator identifier. Keys replies, timeouts and verkeys.
pub type NodeAlias = String;

/// Request identifier as it appears on the wire (`reqId`).
pub type RequestId = String;

/// Identifier of one connection pool inside a router.
pub type ConnectionId = u64;

/// One validator node as seen by a connection pool.
///
/// Immutable after construction except for `blacklisted`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Node alias.
    pub name: NodeAlias,
    /// x25519 public key the node's channel must authenticate with.
    pub boxed_pubkey: [u8; 32],
    /// Client-facing address, `tcp://host:port`.
    pub address: String,
    /// Demoted nodes are never connected to.
    pub blacklisted: bool,
}

impl RemoteNode {
    /// Create a non-blacklisted node.
    pub fn new(name: impl Into<NodeAlias>, boxed_pubkey: [u8; 32], address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            boxed_pubkey,
            address: address.into(),
            blacklisted: false,
        }
    }

    /// `host:port` part of the address, without the `tcp://` scheme.
    pub fn socket_address(&self) -> &str {
        self.address
            .strip_prefix("tcp://")
            .unwrap_or(&self.address)
    }
}

impl fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteNode")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("blacklisted", &self.blacklisted)
            .finish()
    }
}

/// BLS verification key of a validator (G2 point, compressed or serialized).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationKey(Vec<u8>);

impl VerificationKey {
    /// Compressed G2 length.
    pub const COMPRESSED_LEN: usize = 96;
    /// Uncompressed G2 length.
    pub const SERIALIZED_LEN: usize = 192;

    /// Wrap raw key bytes, checking only the length.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        match bytes.len() {
            Self::COMPRESSED_LEN | Self::SERIALIZED_LEN => Ok(Self(bytes)),
            other => Err(ConfigError::InvalidKey(format!(
                "BLS verification key must be {} or {} bytes, got {}",
                Self::COMPRESSED_LEN,
                Self::SERIALIZED_LEN,
                other
            ))),
        }
    }

    /// Decode a base58 key as found in genesis transactions.
    pub fn from_base58(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| ConfigError::InvalidKey(format!("blskey is not base58: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({})", bs58::encode(&self.0).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_address_strips_scheme() {
        let node = RemoteNode::new("Node1", [0u8; 32], "tcp://10.0.0.2:9702");
        assert_eq!(node.socket_address(), "10.0.0.2:9702");

        let bare = RemoteNode::new("Node2", [0u8; 32], "10.0.0.3:9704");
        assert_eq!(bare.socket_address(), "10.0.0.3:9704");
    }

    #[test]
    fn test_verification_key_length_checked() {
        assert!(VerificationKey::from_bytes(vec![1u8; 96]).is_ok());
        assert!(VerificationKey::from_bytes(vec![1u8; 192]).is_ok());
        assert!(VerificationKey::from_bytes(vec![1u8; 128]).is_err());
    }

    #[test]
    fn test_verification_key_from_base58() {
        let encoded = bs58::encode(vec![7u8; 96]).into_string();
        let key = VerificationKey::from_base58(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 96][..]);

        assert!(VerificationKey::from_base58("0OIl").is_err());
    }
}
