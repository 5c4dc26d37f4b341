//! # State Proof Verifier
//!
//! A proof is accepted only when all four checks pass, in this order:
//!
//! 1. the signed `state_root_hash` equals the proof's root
//! 2. the trie holds the expected values under the claimed keys
//! 3. the aggregate BLS signature over the signed value verifies
//! 4. the signature is no older than the freshness threshold

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shared_types::{NodeAlias, VerificationKey};
use tracing::debug;

use crate::algorithms::{check_kv, parse_reply_state_proofs, values_match, verify_multisignature, verify_range};
use crate::domain::{BlsGenerator, KeyValuesToVerify, ProofError, StateProof};
use crate::ports::ReplyVerifier;

/// Verifies state proofs against the pool's validator keys.
#[derive(Debug, Clone)]
pub struct StateProofVerifier {
    verkeys: Arc<BTreeMap<NodeAlias, VerificationKey>>,
    threshold: usize,
    generator: BlsGenerator,
    freshness_threshold: Duration,
}

impl StateProofVerifier {
    /// `threshold` is the number of faulty nodes tolerated; a signature
    /// needs `|verkeys| - threshold` participants.
    pub fn new(
        verkeys: Arc<BTreeMap<NodeAlias, VerificationKey>>,
        threshold: usize,
        generator: BlsGenerator,
        freshness_threshold: Duration,
    ) -> Self {
        Self {
            verkeys,
            threshold,
            generator,
            freshness_threshold,
        }
    }

    /// Validator keys this verifier checks signatures against.
    pub fn verkeys(&self) -> &BTreeMap<NodeAlias, VerificationKey> {
        &self.verkeys
    }

    /// Check one proof at `now` (unix seconds).
    pub fn verify(&self, proof: &StateProof, now: u64) -> Result<(), ProofError> {
        let signed_root = proof.multi_signature.state_root_hash().unwrap_or_default();
        if signed_root != proof.root_hash {
            return Err(ProofError::RootMismatch {
                signed: signed_root.to_string(),
                proof: proof.root_hash.clone(),
            });
        }

        self.check_claims(proof)?;

        let signature = proof.multi_signature.signature_bytes()?;
        let signed_bytes = proof.multi_signature.signed_bytes()?;
        if !verify_multisignature(
            &signature,
            &proof.multi_signature.participants,
            &signed_bytes,
            &self.verkeys,
            self.threshold,
            &self.generator,
        ) {
            return Err(ProofError::BadSignature);
        }

        let signed_at = proof
            .multi_signature
            .timestamp()
            .ok_or_else(|| ProofError::InvalidReply("multi_signature.value.timestamp missing".into()))?;
        if now.saturating_sub(signed_at) > self.freshness_threshold.as_secs() {
            return Err(ProofError::Stale { signed_at, now });
        }

        Ok(())
    }

    fn check_claims(&self, proof: &StateProof) -> Result<(), ProofError> {
        match &proof.kvs_to_verify {
            KeyValuesToVerify::Simple(kvs) => kvs.iter().try_for_each(|(key, value)| {
                check_kv(&proof.proof_nodes, &proof.root_hash, key, value.as_deref())
            }),
            KeyValuesToVerify::NumericalSuffix {
                prefix,
                from,
                to,
                values,
            } => {
                let found = verify_range(&proof.proof_nodes, &proof.root_hash, prefix, *from, *to)?;
                if found.len() != values.len() {
                    return Err(ProofError::ValueMismatch);
                }
                let prefix = String::from_utf8_lossy(prefix);
                for (suffix, expected) in values {
                    match found.get(&format!("{prefix}{suffix}")) {
                        Some(actual) if values_match(actual, expected) => {}
                        _ => return Err(ProofError::ValueMismatch),
                    }
                }
                Ok(())
            }
        }
    }
}

impl ReplyVerifier for StateProofVerifier {
    fn verify_reply(&self, txn_type: &str, sp_key: &[u8], result: &Value, now: u64) -> bool {
        let proofs = match parse_reply_state_proofs(txn_type, sp_key, result) {
            Ok(proofs) => proofs,
            Err(e) => {
                debug!(txn_type, error = %e, "Reply has no checkable state proof");
                return false;
            }
        };
        proofs.iter().all(|proof| match self.verify(proof, now) {
            Ok(()) => true,
            Err(e) => {
                debug!(txn_type, error = %e, "State proof rejected");
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::expected_value;
    use crate::domain::txn_types::GET_CRED_DEF;
    use crate::testing::{sign_state, signed_state_value, test_validators, BlsTestSigner, ProofTrieBuilder};
    use serde_json::json;

    const NOW: u64 = 1_700_000_000;
    const KEY: &[u8] = b"did1:3:CL:10:tag";

    struct Fixture {
        signers: Vec<(NodeAlias, BlsTestSigner)>,
        verifier: StateProofVerifier,
    }

    fn fixture() -> Fixture {
        let generator = BlsGenerator::default();
        let (signers, verkeys) = test_validators(4, &generator);
        let verifier = StateProofVerifier::new(Arc::new(verkeys), 1, generator, Duration::from_secs(600));
        Fixture { signers, verifier }
    }

    fn proof_for(trie: &ProofTrieBuilder, signers: &[&(NodeAlias, BlsTestSigner)], signed_at: u64, kvs: KeyValuesToVerify) -> StateProof {
        let (proof_nodes, root_hash) = trie.encode();
        StateProof {
            multi_signature: sign_state(signers, signed_state_value(&root_hash, signed_at)),
            proof_nodes,
            root_hash,
            kvs_to_verify: kvs,
        }
    }

    fn single_entry_trie() -> ProofTrieBuilder {
        let mut trie = ProofTrieBuilder::new();
        trie.insert(KEY, "{\"lsn\":5,\"lut\":6,\"val\":{\"a\":1}}");
        trie.insert(b"did2:other", "unrelated");
        trie
    }

    fn claim(value: Option<&str>) -> KeyValuesToVerify {
        KeyValuesToVerify::Simple(vec![(KEY.to_vec(), value.map(str::to_string))])
    }

    #[test]
    fn test_valid_proof_accepted() {
        let fx = fixture();
        let all: Vec<_> = fx.signers.iter().collect();
        let proof = proof_for(&single_entry_trie(), &all, NOW - 10, claim(Some("{\"lsn\":5,\"lut\":6,\"val\":{\"a\":1}}")));
        assert_eq!(fx.verifier.verify(&proof, NOW), Ok(()));
    }

    #[test]
    fn test_root_mismatch_rejected() {
        let fx = fixture();
        let all: Vec<_> = fx.signers.iter().collect();
        let mut proof = proof_for(&single_entry_trie(), &all, NOW, claim(None));
        proof.root_hash = ProofTrieBuilder::new().insert(b"x", "y").root_hash();
        assert!(matches!(fx.verifier.verify(&proof, NOW), Err(ProofError::RootMismatch { .. })));
    }

    #[test]
    fn test_wrong_value_rejected_before_signature() {
        let fx = fixture();
        let all: Vec<_> = fx.signers.iter().collect();
        let proof = proof_for(&single_entry_trie(), &all, NOW, claim(Some("{\"lsn\":5}")));
        assert_eq!(fx.verifier.verify(&proof, NOW), Err(ProofError::ValueMismatch));
    }

    #[test]
    fn test_too_few_signers_rejected() {
        let fx = fixture();
        let two: Vec<_> = fx.signers.iter().take(2).collect();
        let proof = proof_for(&single_entry_trie(), &two, NOW, claim(Some("{\"lsn\":5,\"lut\":6,\"val\":{\"a\":1}}")));
        assert_eq!(fx.verifier.verify(&proof, NOW), Err(ProofError::BadSignature));
    }

    #[test]
    fn test_stale_signature_rejected() {
        let fx = fixture();
        let all: Vec<_> = fx.signers.iter().collect();
        let value = Some("{\"lsn\":5,\"lut\":6,\"val\":{\"a\":1}}");

        let at_limit = proof_for(&single_entry_trie(), &all, NOW - 600, claim(value));
        assert_eq!(fx.verifier.verify(&at_limit, NOW), Ok(()));

        let stale = proof_for(&single_entry_trie(), &all, NOW - 601, claim(value));
        assert_eq!(
            fx.verifier.verify(&stale, NOW),
            Err(ProofError::Stale { signed_at: NOW - 601, now: NOW })
        );
    }

    #[test]
    fn test_numerical_suffix_claims() {
        let fx = fixture();
        let all: Vec<_> = fx.signers.iter().collect();
        let mut trie = ProofTrieBuilder::new();
        for i in 1..=4u64 {
            trie.insert(format!("rev:{i}").as_bytes(), &format!("entry-{i}"));
        }

        let claims = KeyValuesToVerify::NumericalSuffix {
            prefix: b"rev:".to_vec(),
            from: 2,
            to: 4,
            values: vec![(2, "entry-2".into()), (3, "entry-3".into())],
        };
        let proof = proof_for(&trie, &all, NOW, claims);
        assert_eq!(fx.verifier.verify(&proof, NOW), Ok(()));

        let short = KeyValuesToVerify::NumericalSuffix {
            prefix: b"rev:".to_vec(),
            from: 2,
            to: 4,
            values: vec![(2, "entry-2".into())],
        };
        let proof = proof_for(&trie, &all, NOW, short);
        assert_eq!(fx.verifier.verify(&proof, NOW), Err(ProofError::ValueMismatch));
    }

    #[test]
    fn test_verify_reply_end_to_end() {
        let fx = fixture();
        let all: Vec<_> = fx.signers.iter().collect();
        let mut result = json!({"type": GET_CRED_DEF, "seqNo": 5, "txnTime": 6, "data": {"primary": {"n": "1"}}});
        let stored = expected_value(GET_CRED_DEF, KEY, &result).unwrap().unwrap();

        let mut trie = ProofTrieBuilder::new();
        trie.insert(KEY, &stored);
        let (proof_nodes, root_hash) = trie.encode();
        let multi_signature = sign_state(&all, signed_state_value(&root_hash, NOW));
        result["state_proof"] = json!({
            "proof_nodes": proof_nodes,
            "root_hash": root_hash,
            "multi_signature": serde_json::to_value(&multi_signature).unwrap(),
        });

        assert!(fx.verifier.verify_reply(GET_CRED_DEF, KEY, &result, NOW));
        assert!(!fx.verifier.verify_reply(GET_CRED_DEF, KEY, &result, NOW + 3600));

        result["data"] = json!({"primary": {"n": "2"}});
        assert!(!fx.verifier.verify_reply(GET_CRED_DEF, KEY, &result, NOW));
    }

    #[test]
    fn test_verify_reply_without_proof_is_untrusted() {
        let fx = fixture();
        let result = json!({"type": GET_CRED_DEF, "seqNo": 5, "txnTime": 6, "data": {"a": 1}});
        assert!(!fx.verifier.verify_reply(GET_CRED_DEF, KEY, &result, NOW));
    }
}
