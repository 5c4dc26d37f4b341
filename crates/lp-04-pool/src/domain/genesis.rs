//! # Genesis Loading
//!
//! A genesis file holds one pool ledger transaction per line. Every line is
//! a leaf of the initial [`LedgerView`]; the NODE transactions (`type "0"`)
//! also define the validator set.
//!
//! ```text
//! {"txn":{"type":"0","data":{"dest":"<b58 ed25519>","data":{
//!     "alias":"Node1","client_ip":"10.0.0.2","client_port":9702,
//!     "node_ip":"10.0.0.2","node_port":9701,"services":["VALIDATOR"],
//!     "blskey":"<b58 G2>","blskey_pop":"<b58>"}}}, "txnMetadata":{"seqNo":1}}
//! ```
//!
//! Later transactions for the same `dest` overwrite only the fields they
//! carry; a node whose `services` lack `VALIDATOR` is kept but blacklisted.

use std::collections::BTreeMap;

use ed25519_dalek::VerifyingKey;
use lp_03_request::LedgerView;
use serde::Deserialize;
use serde_json::Value;
use shared_types::{ConfigError, NodeAlias, RemoteNode, VerificationKey};
use tracing::{debug, warn};

/// Transaction type of a NODE transaction.
pub const NODE_TXN_TYPE: &str = "0";

/// Service a node must announce to be contacted.
pub const VALIDATOR_SERVICE: &str = "VALIDATOR";

/// Parse genesis text into ledger transactions. Blank lines are skipped.
pub fn parse_genesis(text: &str) -> Result<Vec<Value>, ConfigError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| ConfigError::InvalidGenesis(format!("line {n}: {e}")))
        })
        .collect()
}

/// Initial ledger view from genesis text.
pub fn ledger_from_genesis(text: &str) -> Result<LedgerView, ConfigError> {
    let txns = parse_genesis(text)?;
    if txns.is_empty() {
        return Err(ConfigError::InvalidGenesis("genesis is empty".into()));
    }
    LedgerView::from_txns(txns).map_err(|e| ConfigError::InvalidGenesis(e.to_string()))
}

/// Nodes and validator keys described by a pool ledger.
#[derive(Debug, Clone, Default)]
pub struct PoolNodes {
    /// Every node, blacklisted ones included
    pub nodes: Vec<RemoteNode>,
    /// BLS keys of the contactable validators
    pub verkeys: BTreeMap<NodeAlias, VerificationKey>,
}

impl PoolNodes {
    /// Nodes that may be connected to.
    pub fn active_nodes(&self) -> impl Iterator<Item = &RemoteNode> {
        self.nodes.iter().filter(|n| !n.blacklisted)
    }

    /// Whether `alias` names a blacklisted node.
    pub fn is_blacklisted(&self, alias: &str) -> bool {
        self.nodes.iter().any(|n| n.name == alias && n.blacklisted)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
struct NodeFields {
    alias: Option<String>,
    client_ip: Option<String>,
    client_port: Option<u16>,
    node_ip: Option<String>,
    node_port: Option<u16>,
    services: Option<Vec<String>>,
    blskey: Option<String>,
    blskey_pop: Option<String>,
}

impl NodeFields {
    fn merge(&mut self, update: NodeFields) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if update.$field.is_some() { self.$field = update.$field; })*
            };
        }
        take!(alias, client_ip, client_port, node_ip, node_port, services, blskey, blskey_pop);
    }
}

/// Build the node set from the NODE transactions of a ledger.
pub fn build_node_state(view: &LedgerView) -> Result<PoolNodes, ConfigError> {
    let mut by_dest: BTreeMap<String, NodeFields> = BTreeMap::new();
    for txn in view.txns() {
        let body = txn.get("txn").unwrap_or(txn);
        if body.get("type").and_then(Value::as_str) != Some(NODE_TXN_TYPE) {
            continue;
        }
        let data = body
            .get("data")
            .ok_or_else(|| ConfigError::InvalidGenesis("NODE transaction without data".into()))?;
        let dest = data
            .get("dest")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::InvalidGenesis("NODE transaction without dest".into()))?;
        let fields: NodeFields = match data.get("data") {
            Some(fields) => serde_json::from_value(fields.clone())
                .map_err(|e| ConfigError::InvalidGenesis(format!("node {dest}: {e}")))?,
            None => NodeFields::default(),
        };
        by_dest.entry(dest.to_string()).or_default().merge(fields);
    }

    let mut pool = PoolNodes::default();
    for (dest, fields) in by_dest {
        let node = remote_node(&dest, &fields)?;
        if node.blacklisted {
            debug!(alias = %node.name, "Node is not a validator, blacklisted");
        } else {
            match fields.blskey.as_deref().map(VerificationKey::from_base58) {
                Some(Ok(key)) => {
                    pool.verkeys.insert(node.name.clone(), key);
                }
                Some(Err(e)) => return Err(e),
                None => warn!(alias = %node.name, "Validator without BLS key"),
            }
        }
        pool.nodes.push(node);
    }

    if pool.verkeys.is_empty() {
        return Err(ConfigError::NoValidators);
    }
    Ok(pool)
}

fn remote_node(dest: &str, fields: &NodeFields) -> Result<RemoteNode, ConfigError> {
    let alias = fields
        .alias
        .clone()
        .ok_or_else(|| ConfigError::InvalidGenesis(format!("node {dest} has no alias")))?;
    let (Some(ip), Some(port)) = (&fields.client_ip, fields.client_port) else {
        return Err(ConfigError::InvalidGenesis(format!("node {alias} has no client address")));
    };

    let mut node = RemoteNode::new(alias, boxed_pubkey(dest)?, format!("tcp://{ip}:{port}"));
    node.blacklisted = !fields
        .services
        .as_ref()
        .is_some_and(|s| s.iter().any(|s| s == VALIDATOR_SERVICE));
    Ok(node)
}

/// x25519 key of a node from its base58 ed25519 verkey.
pub fn boxed_pubkey(dest: &str) -> Result<[u8; 32], ConfigError> {
    let bytes: [u8; 32] = bs58::decode(dest)
        .into_vec()
        .map_err(|e| ConfigError::InvalidKey(format!("dest {dest}: {e}")))?
        .try_into()
        .map_err(|b: Vec<u8>| ConfigError::InvalidKey(format!("dest {dest} is {} bytes", b.len())))?;
    let verkey = VerifyingKey::from_bytes(&bytes).map_err(|e| ConfigError::InvalidKey(format!("dest {dest}: {e}")))?;
    Ok(verkey.to_montgomery().to_bytes())
}
