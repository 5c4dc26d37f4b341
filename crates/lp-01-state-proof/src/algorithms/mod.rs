//! # Algorithms
//!
//! - `trie_walk`: Patricia-Merkle proof lookup and range collection
//! - `multi_signature`: BLS12-381 aggregate signature check
//! - `proof_key`: request to state key mapping
//! - `reply_parser`: reply to expected value mapping

pub mod multi_signature;
pub mod proof_key;
pub mod reply_parser;
pub mod trie_walk;

pub use multi_signature::{standard_generator, verify_multisignature, DST};
pub use proof_key::{derive_proof_key, is_full_taa_value_expected, TAA_AML_LATEST_KEY, TAA_LATEST_KEY};
pub use reply_parser::{expected_value, parse_reply_state_proofs};
pub use trie_walk::{check_kv, values_match, verify_kv, verify_range, TrieProof};
