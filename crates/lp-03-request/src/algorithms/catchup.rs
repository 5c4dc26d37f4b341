//! # Pool Ledger Catch-up
//!
//! Agreeing on a catch-up target and applying catch-up replies to a copy of
//! the local ledger.
//!
//! ## Target Agreement
//!
//! Nodes answer the client's `LEDGER_STATUS` with their own status (same
//! ledger) or a `CONSISTENCY_PROOF` (larger ledger). Both reduce to a
//! [`CatchupTarget`]; a target backed by `n − f` nodes is accepted.

use tracing::debug;

use super::merkle;
use crate::domain::{
    decode_hash, CatchupReply, CatchupRequest, ConsistencyProof, Hash, LedgerStatus, LedgerView,
    RequestError, WireMessage, POOL_LEDGER_ID,
};

/// A ledger state announced by a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatchupTarget {
    /// Merkle root
    pub root: Hash,
    /// Number of transactions
    pub size: usize,
    /// Proof from the client's ledger, empty for a status announcement
    pub hashes: Vec<Hash>,
}

impl CatchupTarget {
    /// Target announced by a `LEDGER_STATUS`.
    pub fn from_status(status: &LedgerStatus) -> Result<Self, RequestError> {
        Ok(Self {
            root: decode_hash(&status.merkle_root)?,
            size: to_size(status.txn_seq_no)?,
            hashes: Vec::new(),
        })
    }

    /// Target announced by a `CONSISTENCY_PROOF`.
    pub fn from_proof(proof: &ConsistencyProof) -> Result<Self, RequestError> {
        Ok(Self {
            root: decode_hash(&proof.new_merkle_root)?,
            size: to_size(proof.seq_no_end)?,
            hashes: decode_hashes(&proof.hashes)?,
        })
    }
}

fn to_size(seq_no: u64) -> Result<usize, RequestError> {
    usize::try_from(seq_no).map_err(|_| RequestError::Encoding(format!("ledger size {seq_no} out of range")))
}

fn decode_hashes(hashes: &[String]) -> Result<Vec<Hash>, RequestError> {
    hashes.iter().map(|h| decode_hash(h)).collect()
}

/// What an agreed target means for the local ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetVerdict {
    /// Nothing to fetch.
    Synced,
    /// Fetch up to the target.
    Behind,
    /// The target cannot be reached from the local ledger.
    Unusable(String),
}

/// Compare an agreed target with the local ledger.
pub fn evaluate_target(view: &LedgerView, target: &CatchupTarget) -> TargetVerdict {
    let count = view.count();
    if target.size == count {
        if target.root == view.root_hash() {
            return TargetVerdict::Synced;
        }
        return TargetVerdict::Unusable("pool ledger root differs at equal size".into());
    }
    if target.size < count {
        return TargetVerdict::Unusable(format!(
            "pool ledger has {} transactions, local view has {count}",
            target.size
        ));
    }
    if view.is_prefix_of(target.size, &target.root, &target.hashes) {
        TargetVerdict::Behind
    } else {
        TargetVerdict::Unusable("consistency proof does not extend the local ledger".into())
    }
}

/// Progress of a catch-up reply toward the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchupProgress {
    /// The copy reached the target.
    Complete(LedgerView),
    /// The copy is a verified prefix of the target.
    Partial(LedgerView),
}

/// Apply `reply` to a copy of `view` and check it against the target.
///
/// Only transactions continuing the copy without a gap are applied.
pub fn apply_catchup_reply(
    view: &LedgerView,
    reply: &CatchupReply,
    target_root: &Hash,
    target_size: usize,
) -> Result<CatchupProgress, RequestError> {
    let mut copy = view.clone();
    for (seq_no, txn) in reply.ordered_txns() {
        let expected = copy.count() as u64 + 1;
        if seq_no < expected {
            continue;
        }
        if seq_no > expected {
            debug!(seq_no, expected, "Gap in catch-up reply");
            break;
        }
        copy.append(txn.clone())?;
        if copy.count() == target_size {
            break;
        }
    }

    if copy.count() == view.count() {
        return Err(RequestError::InvalidCatchup("no transaction continues the local ledger".into()));
    }
    if copy.count() == target_size {
        return if copy.root_hash() == *target_root {
            Ok(CatchupProgress::Complete(copy))
        } else {
            Err(RequestError::InvalidCatchup("root mismatch at target size".into()))
        };
    }

    let proof = decode_hashes(&reply.cons_proof)?;
    if merkle::verify_consistency(copy.count(), &copy.root_hash(), target_size, target_root, &proof) {
        Ok(CatchupProgress::Partial(copy))
    } else {
        Err(RequestError::InvalidCatchup("partial ledger is not a prefix of the target".into()))
    }
}

/// Serialized `LEDGER_STATUS` describing the local ledger.
pub fn ledger_status_message(view: &LedgerView, protocol_version: u64) -> Result<String, RequestError> {
    WireMessage::LedgerStatus(LedgerStatus {
        ledger_id: POOL_LEDGER_ID,
        txn_seq_no: view.count() as u64,
        merkle_root: view.root_hash_b58(),
        pp_seq_no: None,
        view_no: None,
        protocol_version: Some(protocol_version),
    })
    .to_json()
}

/// Serialized `CATCHUP_REQUEST` for everything past `view` up to `target_size`.
pub fn catchup_request_message(view: &LedgerView, target_size: usize) -> Result<String, RequestError> {
    WireMessage::CatchupRequest(CatchupRequest {
        ledger_id: POOL_LEDGER_ID,
        seq_no_start: view.count() as u64 + 1,
        seq_no_end: target_size as u64,
        catchup_till: target_size as u64,
    })
    .to_json()
}
