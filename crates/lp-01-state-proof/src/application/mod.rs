//! # Application Module
//!
//! The verifier service combining trie, signature and freshness checks.

pub mod verifier;

pub use verifier::StateProofVerifier;
