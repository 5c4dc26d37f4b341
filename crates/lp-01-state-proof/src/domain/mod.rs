//! # Domain Layer
//!
//! Trie node shapes, proof value objects, ledger operation codes and errors.

pub mod errors;
pub mod nibbles;
pub mod node;
pub mod txn_types;
pub mod value_objects;

pub use errors::ProofError;
pub use nibbles::{Nibbles, IS_LEAF_MASK, IS_PATH_ODD_MASK};
pub use node::{decode_value, NodeRef, TrieNode};
pub use value_objects::{BlsGenerator, KeyValuesToVerify, MultiSignature, StateProof};

/// 32-byte node hash (SHA3-256 of the node's RLP).
pub type Hash = [u8; 32];

/// Maximum number of nodes followed in one walk.
pub const MAX_PROOF_DEPTH: usize = 128;
