//! # Ledger View
//!
//! The client's copy of the pool ledger. Grows only through catch-up;
//! every leaf is the msgpack encoding of one transaction.

use serde_json::Value;

use crate::algorithms::merkle;
use crate::domain::errors::RequestError;
use crate::domain::Hash;

/// Local append-only pool ledger with its RFC 6962 Merkle tree.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LedgerView {
    txns: Vec<Value>,
    leaves: Vec<Hash>,
}

impl LedgerView {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger holding `txns` in order.
    pub fn from_txns(txns: impl IntoIterator<Item = Value>) -> Result<Self, RequestError> {
        let mut view = Self::new();
        for txn in txns {
            view.append(txn)?;
        }
        Ok(view)
    }

    /// Append one transaction.
    pub fn append(&mut self, txn: Value) -> Result<(), RequestError> {
        let encoded = rmp_serde::to_vec(&txn).map_err(|e| RequestError::Encoding(e.to_string()))?;
        self.leaves.push(merkle::leaf_hash(&encoded));
        self.txns.push(txn);
        Ok(())
    }

    /// Number of transactions.
    pub fn count(&self) -> usize {
        self.txns.len()
    }

    /// Transactions in ledger order.
    pub fn txns(&self) -> &[Value] {
        &self.txns
    }

    /// Merkle root.
    pub fn root_hash(&self) -> Hash {
        merkle::root_of(&self.leaves)
    }

    /// Merkle root as it appears on the wire.
    pub fn root_hash_b58(&self) -> String {
        bs58::encode(self.root_hash()).into_string()
    }

    /// Proof that the first `old_size` transactions are a prefix of this
    /// ledger.
    pub fn consistency_proof(&self, old_size: usize) -> Vec<Hash> {
        merkle::consistency_proof(&self.leaves, old_size)
    }

    /// Whether this ledger is a prefix of the ledger `(size, root)`.
    pub fn is_prefix_of(&self, size: usize, root: &Hash, proof: &[Hash]) -> bool {
        merkle::verify_consistency(self.count(), &self.root_hash(), size, root, proof)
    }
}

impl std::fmt::Debug for LedgerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerView")
            .field("count", &self.count())
            .field("root", &self.root_hash_b58())
            .finish()
    }
}

/// Decode a base58 Merkle hash.
pub fn decode_hash(encoded: &str) -> Result<Hash, RequestError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| RequestError::Encoding(format!("bad base58 hash {encoded}: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| RequestError::Encoding(format!("hash must be 32 bytes, got {}", b.len())))
}

/// Encode a Merkle hash as base58.
pub fn encode_hash(hash: &Hash) -> String {
    bs58::encode(hash).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_txn(seq: u64) -> Value {
        json!({
            "txn": {"type": "0", "data": {"alias": format!("Node{seq}")}},
            "txnMetadata": {"seqNo": seq},
        })
    }

    #[test]
    fn test_empty_view() {
        let view = LedgerView::new();
        assert_eq!(view.count(), 0);
        assert_eq!(view.root_hash(), merkle::empty_root());
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let txn = node_txn(1);
        let view = LedgerView::from_txns([txn.clone()]).unwrap();
        let expected = merkle::leaf_hash(&rmp_serde::to_vec(&txn).unwrap());
        assert_eq!(view.root_hash(), expected);
    }

    #[test]
    fn test_key_order_does_not_change_root() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        assert_eq!(
            LedgerView::from_txns([a]).unwrap().root_hash(),
            LedgerView::from_txns([b]).unwrap().root_hash()
        );
    }

    #[test]
    fn test_prefix_check_against_grown_copy() {
        let view = LedgerView::from_txns((1..=3).map(node_txn)).unwrap();
        let mut grown = view.clone();
        for seq in 4..=7 {
            grown.append(node_txn(seq)).unwrap();
        }
        let proof = grown.consistency_proof(view.count());
        assert!(view.is_prefix_of(grown.count(), &grown.root_hash(), &proof));

        let other = LedgerView::from_txns((2..=4).map(node_txn)).unwrap();
        assert!(!other.is_prefix_of(grown.count(), &grown.root_hash(), &proof));
    }

    #[test]
    fn test_hash_codec() {
        let view = LedgerView::from_txns([node_txn(1)]).unwrap();
        assert_eq!(decode_hash(&view.root_hash_b58()).unwrap(), view.root_hash());
        assert!(decode_hash("0OIl").is_err());
        assert!(decode_hash(&bs58::encode([1u8; 5]).into_string()).is_err());
    }
}
