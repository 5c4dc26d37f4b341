//! # Proof Key Derivation
//!
//! Maps a read request to the state key its answer is stored under, so a
//! single node's reply can be checked against the signed trie.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::txn_types::*;

const MARKER_ATTR: char = '1';
const MARKER_SCHEMA: char = '2';
const MARKER_CRED_DEF: char = '3';
const MARKER_REVOC_REG_DELTA: char = '5';
const MARKER_REVOC_REG_ENTRY: char = '6';
const MARKER_AUTH_RULE: char = '1';
const MARKER_TAA: char = '2';
const MARKER_TAA_AML: char = '3';

/// Key for the latest transaction author agreement.
pub const TAA_LATEST_KEY: &str = "2:latest";
/// Key for the latest acceptance mechanism list.
pub const TAA_AML_LATEST_KEY: &str = "3:latest";

/// State key for the request, or `None` when the operation type has no
/// built-in state proof or a required parameter is missing.
pub fn derive_proof_key(request: &Value) -> Option<Vec<u8>> {
    let op = request.get("operation")?;
    let txn_type = op.get("type")?.as_str()?;
    let str_field = |name: &str| op.get(name).and_then(Value::as_str);

    let suffix: String = match txn_type {
        GET_ATTR => {
            let name = str_field("raw")
                .or_else(|| str_field("enc"))
                .or_else(|| str_field("hash"))?;
            format!(":{}:{}", MARKER_ATTR, hex::encode(Sha256::digest(name.as_bytes())))
        }
        GET_CRED_DEF => {
            let signature_type = str_field("signature_type")?;
            let schema_ref = op.get("ref")?.as_u64()?;
            let tag = str_field("tag")
                .map(|tag| format!(":{tag}"))
                .unwrap_or_default();
            format!(":{MARKER_CRED_DEF}:{signature_type}:{schema_ref}{tag}")
        }
        GET_NYM | GET_REVOC_REG_DEF => String::new(),
        GET_SCHEMA => {
            let data = op.get("data")?;
            let name = data.get("name")?.as_str()?;
            let version = data.get("version")?.as_str()?;
            format!(":{MARKER_SCHEMA}:{name}:{version}")
        }
        GET_REVOC_REG => {
            let id = str_field("revocRegDefId")?;
            format!("{MARKER_REVOC_REG_ENTRY}:{id}")
        }
        GET_REVOC_REG_DELTA => {
            let id = str_field("revocRegDefId")?;
            let marker = if op.get("from").map_or(true, Value::is_null) {
                MARKER_REVOC_REG_DELTA
            } else {
                MARKER_REVOC_REG_ENTRY
            };
            format!("{marker}:{id}")
        }
        GET_AUTH_RULE => {
            let auth_type = str_field("auth_type")?;
            let auth_action = str_field("auth_action")?;
            let field = str_field("field")?;
            let old_value = match op.get("old_value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None if auth_action == "ADD" => "*".to_string(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            let new_value = match op.get("new_value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            format!("{MARKER_AUTH_RULE}:{auth_type}--{auth_action}--{field}--{old_value}--{new_value}")
        }
        GET_TXN_AUTHR_AGRMT => {
            match (str_field("version"), str_field("digest"), op.get("timestamp").and_then(Value::as_u64)) {
                (None, None, _) => TAA_LATEST_KEY.to_string(),
                (None, Some(digest), None) => format!("{MARKER_TAA}:d:{digest}"),
                (Some(version), None, None) => format!("{MARKER_TAA}:v:{version}"),
                _ => return None,
            }
        }
        GET_TXN_AUTHR_AGRMT_AML => match str_field("version") {
            Some(version) => format!("{MARKER_TAA_AML}:v:{version}"),
            None => TAA_AML_LATEST_KEY.to_string(),
        },
        _ => return None,
    };

    let mut key: Vec<u8> = match txn_type {
        GET_NYM => Sha256::digest(str_field("dest")?.as_bytes()).to_vec(),
        GET_ATTR | GET_SCHEMA => str_field("dest")?.as_bytes().to_vec(),
        GET_CRED_DEF => str_field("origin")?.as_bytes().to_vec(),
        GET_REVOC_REG_DEF => str_field("id")?.as_bytes().to_vec(),
        _ => Vec::new(),
    };
    key.extend_from_slice(suffix.as_bytes());
    Some(key)
}

/// Whether the reply to a request with this key carries the full TAA value
/// rather than its digest.
pub fn is_full_taa_value_expected(sp_key: &[u8]) -> bool {
    sp_key.starts_with(format!("{MARKER_TAA}:d:").as_bytes())
}
