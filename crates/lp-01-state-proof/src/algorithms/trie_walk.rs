//! # Trie Proof Walk
//!
//! Rebuilds the sparse part of a Patricia-Merkle trie that a node sent as
//! proof, then walks it from the signed root.
//!
//! ## Algorithm
//!
//! 1. Decode the base64 blob into an RLP list of nodes.
//! 2. Index every node by SHA3-256 of its raw RLP.
//! 3. Start at the node whose hash is the base58 root.
//! 4. Follow the key's nibbles through Full/Extension/Leaf nodes.
//!
//! A hash reference absent from the index means the proof is incomplete and
//! is rejected. A key that diverges from the trie is "not found".

use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose, Engine as _};
use rlp::Rlp;
use sha3::{Digest, Sha3_256};
use tracing::debug;

use crate::domain::{
    decode_value, Hash, Nibbles, NodeRef, ProofError, TrieNode, MAX_PROOF_DEPTH,
};

/// The nodes of one proof, indexed by hash, anchored at a root.
#[derive(Debug, Clone)]
pub struct TrieProof {
    root: Hash,
    nodes: HashMap<Hash, TrieNode>,
}

impl TrieProof {
    /// Decode a base64 proof blob and a base58 root.
    pub fn decode(proof_nodes: &str, root_hash: &str) -> Result<Self, ProofError> {
        let blob = general_purpose::STANDARD
            .decode(proof_nodes)
            .map_err(|e| ProofError::Encoding(format!("proof_nodes is not base64: {e}")))?;
        let root = bs58::decode(root_hash)
            .into_vec()
            .map_err(|e| ProofError::Encoding(format!("root_hash is not base58: {e}")))?;
        let root: Hash = root
            .as_slice()
            .try_into()
            .map_err(|_| ProofError::Encoding("root_hash is not 32 bytes".into()))?;
        Self::from_rlp(&blob, root)
    }

    /// Build from the raw RLP list of nodes.
    pub fn from_rlp(blob: &[u8], root: Hash) -> Result<Self, ProofError> {
        let list = Rlp::new(blob);
        if !list.is_list() {
            return Err(ProofError::Encoding("proof is not an RLP list".into()));
        }

        let mut nodes = HashMap::new();
        for item in list.iter() {
            let hash: Hash = Sha3_256::digest(item.as_raw()).into();
            nodes.insert(hash, TrieNode::decode(&item)?);
        }
        debug!(nodes = nodes.len(), "Decoded trie proof");

        Ok(Self { root, nodes })
    }

    /// Number of distinct nodes in the proof.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the proof holds no node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn resolve(&self, hash: &Hash) -> Result<&TrieNode, ProofError> {
        self.nodes
            .get(hash)
            .ok_or_else(|| ProofError::IncompleteProof(hex::encode(hash)))
    }

    fn follow<'a>(&'a self, child: &'a NodeRef) -> Result<Option<&'a TrieNode>, ProofError> {
        match child {
            NodeRef::Blank => Ok(None),
            NodeRef::Hash(hash) => self.resolve(hash).map(Some),
            NodeRef::Inline(node) => Ok(Some(node)),
        }
    }

    /// Value stored under `key`, `None` when the key is not in the trie.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ProofError> {
        let path = Nibbles::from_bytes(key);
        let mut pos = 0;
        let mut node = self.resolve(&self.root)?;

        for _ in 0..MAX_PROOF_DEPTH {
            let remaining = path.slice(pos);
            match node {
                TrieNode::Blank => return Ok(None),

                TrieNode::Leaf { path: leaf_path, value } => {
                    if *leaf_path != remaining {
                        return Ok(None);
                    }
                    return decode_value(value).map(Some);
                }

                TrieNode::Extension { path: ext_path, child } => {
                    if !remaining.starts_with(ext_path) {
                        return Ok(None);
                    }
                    pos += ext_path.len();
                    match self.follow(child)? {
                        Some(next) => node = next,
                        None => return Ok(None),
                    }
                }

                TrieNode::Full { children, value } => {
                    if remaining.is_empty() {
                        return value.as_deref().map(decode_value).transpose();
                    }
                    let branch = &children[remaining.at(0) as usize];
                    pos += 1;
                    match self.follow(branch)? {
                        Some(next) => node = next,
                        None => return Ok(None),
                    }
                }
            }
        }

        Err(ProofError::TooDeep {
            max: MAX_PROOF_DEPTH,
        })
    }

    /// Every `(key, value)` whose key starts with `prefix`.
    ///
    /// The whole subtree under the prefix must be present in the proof.
    pub fn collect_prefix(&self, prefix: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, ProofError> {
        let prefix = Nibbles::from_bytes(prefix);
        let mut out = BTreeMap::new();
        let root = self.resolve(&self.root)?;
        self.collect(root, Nibbles::default(), &prefix, 0, &mut out)?;
        Ok(out)
    }

    fn collect(
        &self,
        node: &TrieNode,
        so_far: Nibbles,
        prefix: &Nibbles,
        depth: usize,
        out: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<(), ProofError> {
        if depth >= MAX_PROOF_DEPTH {
            return Err(ProofError::TooDeep {
                max: MAX_PROOF_DEPTH,
            });
        }

        match node {
            TrieNode::Blank => Ok(()),

            TrieNode::Leaf { path, value } => {
                let full = so_far.join(path);
                if full.starts_with(prefix) {
                    insert_entry(out, &full, value)?;
                }
                Ok(())
            }

            TrieNode::Extension { path, child } => {
                let next_path = so_far.join(path);
                if !next_path.is_compatible(prefix) {
                    return Ok(());
                }
                match self.follow(child)? {
                    Some(next) => self.collect(next, next_path, prefix, depth + 1, out),
                    None => Ok(()),
                }
            }

            TrieNode::Full { children, value } => {
                if let Some(value) = value {
                    if so_far.starts_with(prefix) {
                        insert_entry(out, &so_far, value)?;
                    }
                }
                for (nibble, child) in children.iter().enumerate() {
                    let next_path = so_far.push(nibble as u8);
                    if !next_path.is_compatible(prefix) {
                        continue;
                    }
                    if let Some(next) = self.follow(child)? {
                        self.collect(next, next_path, prefix, depth + 1, out)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn insert_entry(
    out: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    path: &Nibbles,
    value: &[u8],
) -> Result<(), ProofError> {
    let key = path
        .to_bytes()
        .ok_or_else(|| ProofError::MalformedProof("key with odd number of nibbles".into()))?;
    out.insert(key, decode_value(value)?);
    Ok(())
}

/// Compare a trie value with an expected one: as JSON when both parse,
/// otherwise as strings.
pub fn values_match(actual: &str, expected: &str) -> bool {
    let as_json = |raw: &str| {
        serde_json::from_str::<serde_json::Value>(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
    };
    actual == expected || as_json(actual) == as_json(expected)
}

/// Check that `key` holds `expected_value` (or is absent when `None`) in
/// the trie rooted at `root_hash`.
///
/// Decoding failures, incomplete and malformed proofs all yield `false`.
pub fn verify_kv(proof_nodes: &str, root_hash: &str, key: &[u8], expected_value: Option<&str>) -> bool {
    match check_kv(proof_nodes, root_hash, key, expected_value) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "State proof rejected");
            false
        }
    }
}

/// [`verify_kv`] with the reason for a rejection.
pub fn check_kv(
    proof_nodes: &str,
    root_hash: &str,
    key: &[u8],
    expected_value: Option<&str>,
) -> Result<(), ProofError> {
    let proof = TrieProof::decode(proof_nodes, root_hash)?;
    let stored = proof.get(key)?;

    match (stored, expected_value) {
        (None, None) => Ok(()),
        (Some(raw), Some(expected)) => {
            let actual = String::from_utf8(raw)
                .map_err(|_| ProofError::Encoding("trie value is not UTF-8".into()))?;
            if values_match(&actual, expected) {
                Ok(())
            } else {
                Err(ProofError::ValueMismatch)
            }
        }
        _ => Err(ProofError::ValueMismatch),
    }
}

/// Collect every key under `key_prefix` whose numeric suffix lies in
/// `[from, to)`, keyed by the full key as a string.
pub fn verify_range(
    proof_nodes: &str,
    root_hash: &str,
    key_prefix: &[u8],
    from: u64,
    to: u64,
) -> Result<BTreeMap<String, String>, ProofError> {
    let proof = TrieProof::decode(proof_nodes, root_hash)?;
    let mut result = BTreeMap::new();

    for (key, value) in proof.collect_prefix(key_prefix)? {
        let Some(suffix) = std::str::from_utf8(&key[key_prefix.len()..])
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        else {
            continue;
        };
        if suffix < from || suffix >= to {
            continue;
        }
        let key = String::from_utf8(key)
            .map_err(|_| ProofError::Encoding("trie key is not UTF-8".into()))?;
        let value = String::from_utf8(value)
            .map_err(|_| ProofError::Encoding("trie value is not UTF-8".into()))?;
        result.insert(key, value);
    }

    Ok(result)
}
