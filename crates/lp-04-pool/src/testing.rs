//! Genesis files and node messages for pool tests.

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;
use lp_03_request::{encode_hash, LedgerView};
use serde_json::{json, Value};
use shared_types::{NodeAlias, VerificationKey};

/// Base58 ed25519 verkey derived from `seed`.
pub fn node_dest(seed: u8) -> String {
    bs58::encode(SigningKey::from_bytes(&[seed; 32]).verifying_key().to_bytes()).into_string()
}

/// NODE transaction announcing a node.
pub fn node_txn(seq_no: u64, seed: u8, alias: &str, services: &[&str], blskey: Option<&VerificationKey>) -> Value {
    let port = 9700 + 2 * u64::from(seed);
    json!({
        "txn": {
            "type": "0",
            "data": {
                "dest": node_dest(seed),
                "data": {
                    "alias": alias,
                    "client_ip": "127.0.0.1",
                    "client_port": port,
                    "node_ip": "127.0.0.1",
                    "node_port": port - 1,
                    "services": services,
                    "blskey": blskey.map(|k| bs58::encode(k.as_bytes()).into_string()),
                }
            }
        },
        "txnMetadata": {"seqNo": seq_no},
    })
}

/// NODE transaction changing some fields of an existing node.
pub fn node_update_txn(seq_no: u64, seed: u8, fields: Value) -> Value {
    json!({
        "txn": {"type": "0", "data": {"dest": node_dest(seed), "data": fields}},
        "txnMetadata": {"seqNo": seq_no},
    })
}

/// One validator NODE transaction per key, seeds and sequence numbers from 1.
pub fn validator_txns(verkeys: &BTreeMap<NodeAlias, VerificationKey>) -> Vec<Value> {
    verkeys
        .iter()
        .enumerate()
        .map(|(i, (alias, key))| node_txn(i as u64 + 1, i as u8 + 1, alias, &["VALIDATOR"], Some(key)))
        .collect()
}

/// Genesis text, one transaction per line.
pub fn genesis_text(txns: &[Value]) -> String {
    txns.iter().map(Value::to_string).collect::<Vec<_>>().join("\n")
}

/// Ledger view over `txns`.
pub fn ledger(txns: &[Value]) -> LedgerView {
    LedgerView::from_txns(txns.iter().cloned()).expect("test transactions encode")
}

/// A node's `LEDGER_STATUS` for `view`.
pub fn ledger_status(view: &LedgerView) -> String {
    json!({
        "op": "LEDGER_STATUS",
        "ledgerId": 0,
        "txnSeqNo": view.count(),
        "merkleRoot": view.root_hash_b58(),
        "ppSeqNo": null,
        "viewNo": null,
        "protocolVersion": 2,
    })
    .to_string()
}

/// A node's `CONSISTENCY_PROOF` from `local` to `full`.
pub fn consistency_proof(local: &LedgerView, full: &LedgerView) -> String {
    json!({
        "op": "CONSISTENCY_PROOF",
        "ledgerId": 0,
        "seqNoStart": local.count(),
        "seqNoEnd": full.count(),
        "viewNo": 0,
        "ppSeqNo": 0,
        "oldMerkleRoot": local.root_hash_b58(),
        "newMerkleRoot": full.root_hash_b58(),
        "hashes": full.consistency_proof(local.count()).iter().map(encode_hash).collect::<Vec<_>>(),
    })
    .to_string()
}

/// A node's `CATCHUP_REPLY` with transactions `from..=to` of `full`.
pub fn catchup_reply(full: &LedgerView, from: usize, to: usize) -> String {
    let txns: BTreeMap<String, Value> = (from..=to)
        .map(|seq_no| (seq_no.to_string(), full.txns()[seq_no - 1].clone()))
        .collect();
    json!({
        "op": "CATCHUP_REPLY",
        "ledgerId": 0,
        "txns": txns,
        "consProof": full.consistency_proof(to).iter().map(encode_hash).collect::<Vec<_>>(),
    })
    .to_string()
}

/// A `REPLY` carrying `result`.
pub fn reply(result: Value) -> String {
    json!({"op": "REPLY", "result": result}).to_string()
}

/// A `REQACK` for `req_id`.
pub fn reqack(req_id: u64) -> String {
    json!({"op": "REQACK", "reqId": req_id}).to_string()
}

/// A `REJECT` for `req_id`.
pub fn reject(req_id: u64, reason: &str) -> String {
    json!({"op": "REJECT", "reqId": req_id, "reason": reason}).to_string()
}
