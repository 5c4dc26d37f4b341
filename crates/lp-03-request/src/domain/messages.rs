//! # Node Wire Messages
//!
//! JSON messages exchanged with validator nodes, tagged by `op`.
//!
//! Only the fields a request machine inspects are typed; a `REPLY` keeps its
//! `result` as raw JSON and the caller receives the message text verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::RequestId;

use super::errors::RequestError;

/// Pool ledger id in catch-up messages.
pub const POOL_LEDGER_ID: u64 = 0;

/// A node message, tagged by its `op` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    /// Ledger size and root announcement.
    LedgerStatus(LedgerStatus),
    /// Proof that a smaller ledger is a prefix of a larger one.
    ConsistencyProof(ConsistencyProof),
    /// Ask a node for a range of ledger transactions.
    CatchupRequest(CatchupRequest),
    /// Range of ledger transactions.
    CatchupReply(CatchupReply),
    /// Answer to a request.
    Reply(Reply),
    /// The node accepted the request for processing.
    Reqack(Acknowledgement),
    /// The node refused the request before processing.
    Reqnack(Acknowledgement),
    /// The node processed and rejected the request.
    Reject(Acknowledgement),
}

impl WireMessage {
    /// Decode a node message.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        serde_json::from_str(raw).map_err(|e| RequestError::Malformed(e.to_string()))
    }

    /// Encode for sending.
    pub fn to_json(&self) -> Result<String, RequestError> {
        serde_json::to_string(self).map_err(|e| RequestError::Encoding(e.to_string()))
    }
}

/// `LEDGER_STATUS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    /// Ledger id
    pub ledger_id: u64,
    /// Number of transactions
    pub txn_seq_no: u64,
    /// Base58 Merkle root
    pub merkle_root: String,
    /// Last ordered 3PC batch, unknown to clients
    #[serde(default)]
    pub pp_seq_no: Option<u64>,
    /// View of the last ordered batch, unknown to clients
    #[serde(default)]
    pub view_no: Option<u64>,
    /// Sender's protocol version
    #[serde(default)]
    pub protocol_version: Option<u64>,
}

/// `CONSISTENCY_PROOF`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyProof {
    /// Ledger id
    pub ledger_id: u64,
    /// Size of the older ledger
    pub seq_no_start: u64,
    /// Size of the newer ledger
    pub seq_no_end: u64,
    /// View number
    #[serde(default)]
    pub view_no: Option<u64>,
    /// 3PC batch number
    #[serde(default)]
    pub pp_seq_no: Option<u64>,
    /// Base58 root of the older ledger
    pub old_merkle_root: String,
    /// Base58 root of the newer ledger
    pub new_merkle_root: String,
    /// Base58 proof hashes
    #[serde(default)]
    pub hashes: Vec<String>,
}

/// `CATCHUP_REQUEST`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchupRequest {
    /// Ledger id
    pub ledger_id: u64,
    /// First requested sequence number
    pub seq_no_start: u64,
    /// Last requested sequence number
    pub seq_no_end: u64,
    /// Ledger size the client is catching up to
    pub catchup_till: u64,
}

/// `CATCHUP_REPLY`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchupReply {
    /// Ledger id
    pub ledger_id: u64,
    /// Transactions keyed by decimal sequence number
    pub txns: BTreeMap<String, Value>,
    /// Base58 consistency proof from the last sent txn to `catchupTill`
    #[serde(default)]
    pub cons_proof: Vec<String>,
}

impl CatchupReply {
    /// Transactions ordered by numeric sequence number. Keys that are not
    /// numbers are skipped.
    pub fn ordered_txns(&self) -> Vec<(u64, &Value)> {
        let mut txns: Vec<(u64, &Value)> = self
            .txns
            .iter()
            .filter_map(|(seq, txn)| seq.parse().ok().map(|seq| (seq, txn)))
            .collect();
        txns.sort_by_key(|(seq, _)| *seq);
        txns
    }
}

/// `REPLY`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Request result; `None` or null marks an unusable reply
    #[serde(default)]
    pub result: Option<Value>,
}

impl Reply {
    /// `result.reqId`, stringified.
    pub fn req_id(&self) -> Option<RequestId> {
        self.result.as_ref().and_then(|r| r.get("reqId")).and_then(stringify_req_id)
    }
}

/// `REQACK`, `REQNACK` and `REJECT`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    /// Request id, number or string
    #[serde(default)]
    pub req_id: Option<Value>,
    /// Refusal reason
    #[serde(default)]
    pub reason: Option<String>,
}

impl Acknowledgement {
    /// `reqId`, stringified.
    pub fn req_id(&self) -> Option<RequestId> {
        self.req_id.as_ref().and_then(stringify_req_id)
    }
}

/// Request ids travel as JSON numbers or strings.
pub fn stringify_req_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
