//! # Ledger Merkle Tree (RFC 6962)
//!
//! Root and consistency proofs for the append-only pool ledger.
//!
//! ```text
//! leaf  = SHA256(0x00 ‖ data)
//! node  = SHA256(0x01 ‖ left ‖ right)
//! empty = SHA256("")
//! ```
//!
//! A tree of `n` leaves splits at `k`, the largest power of two below `n`.

use sha2::{Digest, Sha256};

use crate::domain::Hash;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash of a leaf's data.
pub fn leaf_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of an interior node.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of the empty tree.
pub fn empty_root() -> Hash {
    Sha256::digest(b"").into()
}

fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

/// Merkle tree hash over already hashed leaves.
pub fn root_of(leaves: &[Hash]) -> Hash {
    match leaves.len() {
        0 => empty_root(),
        1 => leaves[0],
        n => {
            let k = split_point(n);
            node_hash(&root_of(&leaves[..k]), &root_of(&leaves[k..]))
        }
    }
}

/// Proof that the first `old_size` leaves are a prefix of `leaves`.
///
/// Empty when `old_size` is zero or covers the whole tree.
pub fn consistency_proof(leaves: &[Hash], old_size: usize) -> Vec<Hash> {
    if old_size == 0 || old_size >= leaves.len() {
        return Vec::new();
    }
    let mut proof = Vec::new();
    subproof(old_size, leaves, true, &mut proof);
    proof
}

fn subproof(m: usize, leaves: &[Hash], complete: bool, proof: &mut Vec<Hash>) {
    let n = leaves.len();
    if m == n {
        if !complete {
            proof.push(root_of(leaves));
        }
        return;
    }
    let k = split_point(n);
    if m <= k {
        subproof(m, &leaves[..k], complete, proof);
        proof.push(root_of(&leaves[k..]));
    } else {
        subproof(m - k, &leaves[k..], false, proof);
        proof.push(root_of(&leaves[..k]));
    }
}

/// Check that the tree `(old_size, old_root)` is a prefix of
/// `(new_size, new_root)`.
///
/// An empty old tree is a prefix of anything.
pub fn verify_consistency(
    old_size: usize,
    old_root: &Hash,
    new_size: usize,
    new_root: &Hash,
    proof: &[Hash],
) -> bool {
    if old_size > new_size {
        return false;
    }
    if old_size == new_size {
        return proof.is_empty() && old_root == new_root;
    }
    if old_size == 0 {
        return true;
    }
    if proof.is_empty() {
        return false;
    }

    let mut path: Vec<Hash> = Vec::with_capacity(proof.len() + 1);
    if old_size.is_power_of_two() {
        path.push(*old_root);
    }
    path.extend_from_slice(proof);

    let mut fn_ = old_size - 1;
    let mut sn = new_size - 1;
    while fn_ & 1 == 1 {
        fn_ >>= 1;
        sn >>= 1;
    }

    let mut fr = path[0];
    let mut sr = path[0];
    for c in &path[1..] {
        if sn == 0 {
            return false;
        }
        if fn_ & 1 == 1 || fn_ == sn {
            fr = node_hash(c, &fr);
            sr = node_hash(c, &sr);
            if fn_ & 1 == 0 {
                while fn_ & 1 == 0 && fn_ != 0 {
                    fn_ >>= 1;
                    sn >>= 1;
                }
            }
        } else {
            sr = node_hash(&sr, c);
        }
        fn_ >>= 1;
        sn >>= 1;
    }

    fr == *old_root && sr == *new_root && sn == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| leaf_hash(format!("txn-{i}").as_bytes())).collect()
    }

    #[test]
    fn test_empty_root_is_hash_of_nothing() {
        assert_eq!(
            hex_of(&root_of(&[])),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    fn hex_of(hash: &Hash) -> String {
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_root_shape_for_three_leaves() {
        let l = leaves(3);
        let expected = node_hash(&node_hash(&l[0], &l[1]), &l[2]);
        assert_eq!(root_of(&l), expected);
    }

    #[test]
    fn test_consistency_for_every_prefix() {
        let all = leaves(13);
        for new_size in 1..=all.len() {
            let new_root = root_of(&all[..new_size]);
            for old_size in 0..=new_size {
                let old_root = root_of(&all[..old_size]);
                let proof = consistency_proof(&all[..new_size], old_size);
                assert!(
                    verify_consistency(old_size, &old_root, new_size, &new_root, &proof),
                    "{old_size} -> {new_size}"
                );
            }
        }
    }

    #[test]
    fn test_inconsistent_trees_rejected() {
        let all = leaves(8);
        let mut forked = all.clone();
        forked[2] = leaf_hash(b"forged");

        let proof = consistency_proof(&all, 4);
        let forked_old = root_of(&forked[..4]);
        assert!(!verify_consistency(4, &forked_old, 8, &root_of(&all), &proof));
        assert!(!verify_consistency(4, &root_of(&all[..4]), 8, &root_of(&forked), &proof));
        assert!(!verify_consistency(4, &root_of(&all[..4]), 8, &root_of(&all), &[]));
        assert!(!verify_consistency(5, &root_of(&all[..5]), 4, &root_of(&all[..4]), &proof));
    }

    #[test]
    fn test_empty_old_tree_always_consistent() {
        let all = leaves(5);
        assert!(verify_consistency(0, &empty_root(), 5, &root_of(&all), &[]));
    }

    proptest! {
        #[test]
        fn prop_consistency_proofs_verify(new_size in 1usize..64, cut in 0usize..64) {
            let all = leaves(new_size);
            let old_size = cut % (new_size + 1);
            let proof = consistency_proof(&all, old_size);
            prop_assert!(verify_consistency(
                old_size,
                &root_of(&all[..old_size]),
                new_size,
                &root_of(&all),
                &proof,
            ));
        }
    }
}
