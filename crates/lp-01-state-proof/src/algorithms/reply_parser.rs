//! # Reply Parsing
//!
//! Turns a read reply's `result` into the state proofs to verify: the
//! proof material from `state_proof` plus the value the trie must hold
//! under the request's key, rebuilt from the reply data the way the ledger
//! stores it.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use super::proof_key::is_full_taa_value_expected;
use crate::domain::txn_types::*;
use crate::domain::{KeyValuesToVerify, ProofError, StateProof};

/// Extract every state proof in a reply result.
///
/// Most replies carry one proof. A revocation delta requested with `from`
/// carries a second one (`data.stateProofFrom`) for the starting accumulator.
pub fn parse_reply_state_proofs(
    txn_type: &str,
    sp_key: &[u8],
    result: &Value,
) -> Result<Vec<StateProof>, ProofError> {
    let state_proof = result.get("state_proof").unwrap_or(&Value::Null);
    let value = expected_value(txn_type, sp_key, result)?;
    let mut proofs = vec![StateProof::from_json(
        state_proof,
        KeyValuesToVerify::Simple(vec![(sp_key.to_vec(), value)]),
    )?];

    if txn_type == GET_REVOC_REG_DELTA {
        if let Some(from_proof) = result.pointer("/data/stateProofFrom") {
            let accum_from = result
                .pointer("/data/value/accum_from")
                .filter(|v| !v.is_null())
                .ok_or_else(|| ProofError::InvalidReply("accum_from missing".into()))?;
            let value = json!({
                "lsn": accum_from.get("seqNo"),
                "lut": accum_from.get("txnTime"),
                "val": accum_from,
            });
            proofs.push(StateProof::from_json(
                from_proof,
                KeyValuesToVerify::Simple(vec![(sp_key.to_vec(), Some(value.to_string()))]),
            )?);
        }
    }

    Ok(proofs)
}

/// Value the trie holds for this reply, `None` when the reply proves absence.
pub fn expected_value(txn_type: &str, sp_key: &[u8], result: &Value) -> Result<Option<String>, ProofError> {
    let raw_data = match result.get("data") {
        None | Some(Value::Null) => return Ok(None),
        Some(data) => data,
    };
    let parsed: Value = match raw_data {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        other => other.clone(),
    };
    let seq_no = result.get("seqNo").cloned().unwrap_or(Value::Null);
    let txn_time = result.get("txnTime").cloned().unwrap_or(Value::Null);

    let value = match txn_type {
        GET_NYM => json!({
            "seqNo": seq_no,
            "txnTime": txn_time,
            "identifier": parsed.get("identifier"),
            "role": parsed.get("role"),
            "verkey": parsed.get("verkey"),
        }),
        GET_ATTR => {
            let data = raw_data
                .as_str()
                .ok_or_else(|| ProofError::InvalidReply("attribute data is not a string".into()))?;
            json!({
                "lsn": seq_no,
                "lut": txn_time,
                "val": hex::encode(Sha256::digest(data.as_bytes())),
            })
        }
        GET_CRED_DEF | GET_REVOC_REG_DEF | GET_REVOC_REG | GET_TXN_AUTHR_AGRMT_AML => json!({
            "lsn": seq_no,
            "lut": txn_time,
            "val": parsed,
        }),
        GET_SCHEMA => {
            let mut fields: Map<String, Value> = parsed
                .as_object()
                .cloned()
                .ok_or_else(|| ProofError::InvalidReply("schema data is not an object".into()))?;
            fields.remove("name");
            fields.remove("version");
            if fields.is_empty() {
                return Ok(None);
            }
            json!({"lsn": seq_no, "lut": txn_time, "val": fields})
        }
        GET_REVOC_REG_DELTA => {
            let accum_to = match parsed.pointer("/value/accum_to") {
                None | Some(Value::Null) => return Ok(None),
                Some(v) => v.clone(),
            };
            json!({
                "lsn": accum_to.get("seqNo"),
                "lut": accum_to.get("txnTime"),
                "val": accum_to,
            })
        }
        GET_AUTH_RULE => {
            let constraint = parsed
                .as_array()
                .and_then(|rules| rules.first())
                .and_then(|rule| rule.get("constraint"))
                .cloned()
                .ok_or_else(|| ProofError::InvalidReply("auth rule constraint missing".into()))?;
            constraint
        }
        GET_TXN_AUTHR_AGRMT => {
            if is_full_taa_value_expected(sp_key) {
                json!({"lsn": seq_no, "lut": txn_time, "val": parsed})
            } else {
                parsed
                    .get("digest")
                    .cloned()
                    .ok_or_else(|| ProofError::InvalidReply("agreement digest missing".into()))?
            }
        }
        other => {
            return Err(ProofError::InvalidReply(format!(
                "operation type {other} has no built-in state proof"
            )))
        }
    };

    Ok(Some(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KeyValuesToVerify;

    fn proof_json() -> Value {
        json!({
            "proof_nodes": "AAAA",
            "root_hash": "11111111111111111111111111111111",
            "multi_signature": {
                "participants": ["Node1"],
                "signature": "abc",
                "value": {"state_root_hash": "11111111111111111111111111111111", "timestamp": 1}
            }
        })
    }

    #[test]
    fn test_nym_value() {
        let result = json!({
            "type": GET_NYM,
            "seqNo": 7,
            "txnTime": 1_600_000_000,
            "data": "{\"dest\":\"d\",\"identifier\":\"i\",\"role\":\"0\",\"verkey\":\"~v\"}",
            "state_proof": proof_json(),
        });
        let value = expected_value(GET_NYM, b"k", &result).unwrap().unwrap();
        let value: Value = serde_json::from_str(&value).unwrap();
        assert_eq!(
            value,
            json!({"seqNo": 7, "txnTime": 1_600_000_000, "identifier": "i", "role": "0", "verkey": "~v"})
        );
    }

    #[test]
    fn test_attr_value_is_hash_of_raw_data() {
        let result = json!({"seqNo": 3, "txnTime": 10, "data": "{\"endpoint\":{\"ha\":\"1.2.3.4:9\"}}"});
        let value: Value =
            serde_json::from_str(&expected_value(GET_ATTR, b"k", &result).unwrap().unwrap()).unwrap();
        let expected_hash = hex::encode(Sha256::digest(b"{\"endpoint\":{\"ha\":\"1.2.3.4:9\"}}"));
        assert_eq!(value["val"], json!(expected_hash));
        assert_eq!(value["lsn"], json!(3));
    }

    #[test]
    fn test_null_data_proves_absence() {
        let result = json!({"seqNo": null, "txnTime": null, "data": null});
        assert_eq!(expected_value(GET_NYM, b"k", &result).unwrap(), None);
    }

    #[test]
    fn test_schema_strips_name_and_version() {
        let result = json!({
            "seqNo": 5, "txnTime": 6,
            "data": {"name": "gvt", "version": "1.0", "attr_names": ["age"]}
        });
        let value: Value =
            serde_json::from_str(&expected_value(GET_SCHEMA, b"k", &result).unwrap().unwrap()).unwrap();
        assert_eq!(value["val"], json!({"attr_names": ["age"]}));

        let empty = json!({"seqNo": 5, "txnTime": 6, "data": {"name": "gvt", "version": "1.0"}});
        assert_eq!(expected_value(GET_SCHEMA, b"k", &empty).unwrap(), None);
    }

    #[test]
    fn test_auth_rule_takes_first_constraint() {
        let result = json!({"data": [{"constraint": {"role": "0", "sig_count": 1}}, {"constraint": {}}]});
        let value = expected_value(GET_AUTH_RULE, b"k", &result).unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&value).unwrap(), json!({"role": "0", "sig_count": 1}));
    }

    #[test]
    fn test_taa_digest_or_full_value() {
        let result = json!({"seqNo": 1, "txnTime": 2, "data": {"digest": "dd", "text": "t", "version": "1"}});
        let latest = expected_value(GET_TXN_AUTHR_AGRMT, b"2:latest", &result).unwrap().unwrap();
        assert_eq!(latest, "\"dd\"");

        let full = expected_value(GET_TXN_AUTHR_AGRMT, b"2:d:dd", &result).unwrap().unwrap();
        let full: Value = serde_json::from_str(&full).unwrap();
        assert_eq!(full["val"]["text"], json!("t"));
    }

    #[test]
    fn test_parse_reply_requires_state_proof() {
        let result = json!({"seqNo": 1, "txnTime": 2, "data": {"a": 1}});
        assert_eq!(
            parse_reply_state_proofs(GET_CRED_DEF, b"k", &result),
            Err(ProofError::MissingProof)
        );
    }

    #[test]
    fn test_parse_reply_single_proof() {
        let result = json!({"seqNo": 1, "txnTime": 2, "data": {"a": 1}, "state_proof": proof_json()});
        let proofs = parse_reply_state_proofs(GET_CRED_DEF, b"k", &result).unwrap();
        assert_eq!(proofs.len(), 1);
        match &proofs[0].kvs_to_verify {
            KeyValuesToVerify::Simple(kvs) => assert_eq!(kvs[0].0, b"k".to_vec()),
            other => panic!("unexpected claims {other:?}"),
        }
    }

    #[test]
    fn test_delta_with_from_yields_two_proofs() {
        let result = json!({
            "seqNo": 1,
            "txnTime": 2,
            "data": {
                "value": {
                    "accum_to": {"seqNo": 9, "txnTime": 90, "value": {"accum": "to"}},
                    "accum_from": {"seqNo": 4, "txnTime": 40, "value": {"accum": "from"}}
                },
                "stateProofFrom": proof_json()
            },
            "state_proof": proof_json()
        });
        let proofs = parse_reply_state_proofs(GET_REVOC_REG_DELTA, b"6:rd", &result).unwrap();
        assert_eq!(proofs.len(), 2);
    }
}
