//! Centralized Testing Utilities
//!
//! Builders for proof tries and deterministic BLS validators. Available to
//! other crates with the `test-utils` feature flag.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use blst::min_sig::{AggregateSignature, SecretKey, Signature};
use blst::{
    blst_p2, blst_p2_affine, blst_p2_affine_compress, blst_p2_from_affine, blst_p2_mult,
    blst_p2_to_affine, blst_scalar, blst_scalar_from_bendian,
};
use rlp::{Rlp, RlpStream};
use serde_json::Value;
use sha3::{Digest, Sha3_256};
use shared_types::{NodeAlias, VerificationKey};

use crate::algorithms::multi_signature::{decode_g2, DST};
use crate::domain::{BlsGenerator, Hash, MultiSignature, Nibbles, NodeRef, TrieNode};

// =============================================================================
// PROOF TRIE BUILDER
// =============================================================================

/// Builds a Patricia-Merkle trie and encodes every hashed node as a proof.
#[derive(Debug, Default, Clone)]
pub struct ProofTrieBuilder {
    entries: BTreeMap<Vec<u8>, String>,
}

impl ProofTrieBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`.
    pub fn insert(&mut self, key: &[u8], value: &str) -> &mut Self {
        self.entries.insert(key.to_vec(), value.to_string());
        self
    }

    /// `(base64 proof_nodes, base58 root_hash)` with every hashed node.
    pub fn encode(&self) -> (String, String) {
        let (nodes, root) = self.build();
        encode_proof(nodes.values(), &root)
    }

    /// Like [`encode`](Self::encode) but drops the deepest hashed node on
    /// `key`'s path below the root.
    pub fn encode_without_leaf(&self, key: &[u8]) -> (String, String) {
        let (mut nodes, root) = self.build();
        let victim = deepest_hashed_node(&nodes, &root, key)
            .expect("no hashed node below the root on this key's path");
        nodes.remove(&victim);
        encode_proof(nodes.values(), &root)
    }

    /// Base58 root hash.
    pub fn root_hash(&self) -> String {
        bs58::encode(self.build().1).into_string()
    }

    fn build(&self) -> (BTreeMap<Hash, Vec<u8>>, Hash) {
        let items: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .iter()
            .map(|(k, v)| (Nibbles::from_bytes(k).0, encode_value(v)))
            .collect();

        let mut nodes = BTreeMap::new();
        let root = build_node(&items, &mut nodes);
        let root_hash: Hash = Sha3_256::digest(&root).into();
        nodes.insert(root_hash, root);
        (nodes, root_hash)
    }
}

fn encode_value(value: &str) -> Vec<u8> {
    let mut s = RlpStream::new_list(1);
    s.append(&value.as_bytes().to_vec());
    s.out().to_vec()
}

fn encode_proof<'a>(nodes: impl Iterator<Item = &'a Vec<u8>>, root: &Hash) -> (String, String) {
    let nodes: Vec<&Vec<u8>> = nodes.collect();
    let mut s = RlpStream::new_list(nodes.len());
    for node in nodes {
        s.append_raw(node, 1);
    }
    (
        general_purpose::STANDARD.encode(s.out()),
        bs58::encode(root).into_string(),
    )
}

fn build_node(items: &[(Vec<u8>, Vec<u8>)], nodes: &mut BTreeMap<Hash, Vec<u8>>) -> Vec<u8> {
    match items {
        [] => vec![0x80],
        [(path, value)] => {
            let mut s = RlpStream::new_list(2);
            s.append(&Nibbles(path.clone()).encode_hex_prefix(true));
            s.append(value);
            s.out().to_vec()
        }
        _ => {
            let common = items
                .iter()
                .map(|(p, _)| Nibbles(p.clone()))
                .reduce(|a, b| Nibbles(a.0[..a.common_prefix_len(&b)].to_vec()))
                .map(|n| n.len())
                .unwrap_or(0);

            if common > 0 {
                let stripped: Vec<_> = items
                    .iter()
                    .map(|(p, v)| (p[common..].to_vec(), v.clone()))
                    .collect();
                let child = build_node(&stripped, nodes);
                let mut s = RlpStream::new_list(2);
                s.append(&Nibbles(items[0].0[..common].to_vec()).encode_hex_prefix(false));
                append_child(&mut s, child, nodes);
                return s.out().to_vec();
            }

            let mut s = RlpStream::new_list(17);
            for nibble in 0..16u8 {
                let branch: Vec<_> = items
                    .iter()
                    .filter(|(p, _)| p.first() == Some(&nibble))
                    .map(|(p, v)| (p[1..].to_vec(), v.clone()))
                    .collect();
                if branch.is_empty() {
                    s.append_empty_data();
                } else {
                    let child = build_node(&branch, nodes);
                    append_child(&mut s, child, nodes);
                }
            }
            match items.iter().find(|(p, _)| p.is_empty()) {
                Some((_, value)) => s.append(value),
                None => s.append_empty_data(),
            };
            s.out().to_vec()
        }
    }
}

fn append_child(s: &mut RlpStream, child: Vec<u8>, nodes: &mut BTreeMap<Hash, Vec<u8>>) {
    if child.len() < 32 {
        s.append_raw(&child, 1);
    } else {
        let hash: Hash = Sha3_256::digest(&child).into();
        s.append(&hash.to_vec());
        nodes.insert(hash, child);
    }
}

fn deepest_hashed_node(nodes: &BTreeMap<Hash, Vec<u8>>, root: &Hash, key: &[u8]) -> Option<Hash> {
    let path = Nibbles::from_bytes(key);
    let mut pos = 0;
    let mut deepest = None;
    let mut node = TrieNode::decode(&Rlp::new(nodes.get(root)?)).ok()?;

    loop {
        let next = match node {
            TrieNode::Extension { path: ext, child } if path.slice(pos).starts_with(&ext) => {
                pos += ext.len();
                child
            }
            TrieNode::Full { children, .. } if pos < path.len() => {
                let child = children[path.at(pos) as usize].clone();
                pos += 1;
                child
            }
            _ => return deepest,
        };
        node = match next {
            NodeRef::Hash(hash) => {
                deepest = Some(hash);
                TrieNode::decode(&Rlp::new(nodes.get(&hash)?)).ok()?
            }
            NodeRef::Inline(inner) => *inner,
            NodeRef::Blank => return deepest,
        };
    }
}

// =============================================================================
// BLS VALIDATORS
// =============================================================================

/// Deterministic BLS key for tests.
pub struct BlsTestSigner {
    sk: SecretKey,
}

impl BlsTestSigner {
    /// Key derived from a one-byte seed.
    pub fn from_seed(seed: u8) -> Self {
        let ikm = [seed; 32];
        let sk = SecretKey::key_gen(&ikm, &[]).expect("32-byte ikm is always accepted");
        Self { sk }
    }

    /// `sk * generator`, compressed.
    pub fn verification_key(&self, generator: &BlsGenerator) -> VerificationKey {
        let g = decode_g2(generator.as_bytes()).expect("generator must be a G2 point");
        let pk = scalar_mul_g2(&g, &self.sk.to_bytes());
        VerificationKey::from_bytes(compress_g2(&pk).to_vec()).expect("compressed G2 is 96 bytes")
    }

    /// Compressed signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.sk.sign(message, DST, &[]).to_bytes().to_vec()
    }
}

fn scalar_mul_g2(point: &blst_p2_affine, scalar_be: &[u8; 32]) -> blst_p2_affine {
    let mut scalar = blst_scalar::default();
    let mut projective = blst_p2::default();
    let mut product = blst_p2::default();
    let mut affine = blst_p2_affine::default();
    // SAFETY: every pointer references an initialized local of the right type.
    unsafe {
        blst_scalar_from_bendian(&mut scalar, scalar_be.as_ptr());
        blst_p2_from_affine(&mut projective, point);
        blst_p2_mult(&mut product, &projective, scalar.b.as_ptr(), 255);
        blst_p2_to_affine(&mut affine, &product);
    }
    affine
}

fn compress_g2(point: &blst_p2_affine) -> [u8; 96] {
    let mut out = [0u8; 96];
    // SAFETY: `out` holds a compressed G2 point.
    unsafe { blst_p2_affine_compress(out.as_mut_ptr(), point) };
    out
}

/// A generator other than the standard one: `k * G2` for a seeded `k`.
pub fn custom_generator(seed: u8) -> BlsGenerator {
    let standard = BlsGenerator::default();
    let g = decode_g2(standard.as_bytes()).expect("standard generator decodes");
    let k = SecretKey::key_gen(&[seed.wrapping_add(100); 32], &[])
        .expect("32-byte ikm is always accepted");
    let point = scalar_mul_g2(&g, &k.to_bytes());
    BlsGenerator::from_bytes(compress_g2(&point).to_vec()).expect("96-byte generator")
}

/// Aggregate compressed signatures.
pub fn aggregate_signatures(signatures: &[Vec<u8>]) -> Vec<u8> {
    let parsed: Vec<Signature> = signatures
        .iter()
        .map(|s| Signature::from_bytes(s).expect("test signature decodes"))
        .collect();
    let refs: Vec<&Signature> = parsed.iter().collect();
    AggregateSignature::aggregate(&refs, true)
        .expect("non-empty aggregation")
        .to_signature()
        .to_bytes()
        .to_vec()
}

/// `n` validators named `Node1..Noden` and their verification keys.
pub fn test_validators(
    n: usize,
    generator: &BlsGenerator,
) -> (Vec<(NodeAlias, BlsTestSigner)>, BTreeMap<NodeAlias, VerificationKey>) {
    let signers: Vec<(NodeAlias, BlsTestSigner)> = (1..=n)
        .map(|i| (format!("Node{i}"), BlsTestSigner::from_seed(i as u8)))
        .collect();
    let verkeys = signers
        .iter()
        .map(|(alias, signer)| (alias.clone(), signer.verification_key(generator)))
        .collect();
    (signers, verkeys)
}

/// Multi-signature by `signers` over `msgpack(value)`.
pub fn sign_state(signers: &[&(NodeAlias, BlsTestSigner)], value: Value) -> MultiSignature {
    let unsigned = MultiSignature {
        participants: signers.iter().map(|(alias, _)| alias.clone()).collect(),
        signature: String::new(),
        value,
    };
    let message = unsigned.signed_bytes().expect("JSON value encodes to msgpack");
    let sigs: Vec<Vec<u8>> = signers.iter().map(|(_, s)| s.sign(&message)).collect();
    MultiSignature {
        signature: bs58::encode(aggregate_signatures(&sigs)).into_string(),
        ..unsigned
    }
}

/// `multi_signature.value` for a root signed at `timestamp`.
pub fn signed_state_value(state_root_hash: &str, timestamp: u64) -> Value {
    serde_json::json!({
        "ledger_id": 1,
        "pool_state_root_hash": "7siDH8Qanh82UviK4zjBSfLXcoCvLaeGkrByi1ow9Tsm",
        "state_root_hash": state_root_hash,
        "timestamp": timestamp,
        "txn_root_hash": "BsPLvBr6RK9FxtoDgcbrSrg5PP3D6MFRY5x2kPAQWxBk",
    })
}
