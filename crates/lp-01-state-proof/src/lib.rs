//! # LP-01 State Proof
//!
//! Lets a client trust a single validator's answer to a read request.
//!
//! **Subsystem ID:** 01
//! **Architecture:** Hexagonal (domain / algorithms / application / ports)
//!
//! ## Purpose
//!
//! Validators sign the root of their state trie with an aggregated BLS
//! signature. A read reply carries the trie nodes on the path to the
//! requested key, so one reply is enough when:
//! - the proof nodes hash up to the signed root
//! - the trie holds exactly the value the reply claims
//! - enough validators signed the root
//! - the signature is recent
//!
//! ## Module Structure
//!
//! ```text
//! lp-01-state-proof/
//! ├── domain/          # Nibbles, trie nodes, proof value objects, op codes
//! ├── algorithms/      # Trie walk, BLS check, proof keys, reply parsing
//! ├── application/     # StateProofVerifier
//! └── ports/           # ReplyVerifier
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod application;
pub mod domain;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
#[allow(missing_docs)]
pub mod testing;

pub use algorithms::{
    check_kv, derive_proof_key, expected_value, is_full_taa_value_expected,
    parse_reply_state_proofs, standard_generator, values_match, verify_kv,
    verify_multisignature, verify_range, TrieProof,
};
pub use application::StateProofVerifier;
pub use domain::{
    txn_types, BlsGenerator, Hash, KeyValuesToVerify, MultiSignature, ProofError, StateProof,
};
pub use ports::ReplyVerifier;
