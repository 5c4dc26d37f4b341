//! # Reply Quorum
//!
//! Byzantine threshold arithmetic over node replies.
//!
//! ## Algorithm
//!
//! With `n` validators, at most `f = (n-1)/3` are assumed faulty (none below
//! four nodes). Replies are bucketed by a canonical key; a bucket holding
//! more than `f` distinct nodes is backed by at least one honest node.
//!
//! Consensus stays reachable while the largest bucket plus every node that
//! has not answered yet can still exceed `f`:
//!
//! ```text
//! reachable ⇔ n + max − sum − timeouts − denied > f
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use shared_types::NodeAlias;

/// Maximum number of faulty nodes tolerated among `n`.
pub fn max_failed_nodes(n: usize) -> usize {
    if n >= 4 {
        (n - 1) / 3
    } else {
        0
    }
}

/// Canonical form of a reply `result` for bucketing.
///
/// Drops the per-node `state_proof` and `data.stateProofFrom`; the rest is
/// serialized with sorted keys.
pub fn canonical_reply(result: &Value) -> String {
    let mut result = result.clone();
    if let Some(obj) = result.as_object_mut() {
        obj.remove("state_proof");
        if let Some(data) = obj.get_mut("data").and_then(Value::as_object_mut) {
            data.remove("stateProofFrom");
        }
    }
    result.to_string()
}

/// Per-node answers of one request.
///
/// Every alias sits in at most one place: a bucket, `denied` or
/// `timed_out`. A late answer moves an alias out of `timed_out`.
#[derive(Debug, Clone)]
pub struct ReplyTally<K: Ord> {
    buckets: BTreeMap<K, BTreeSet<NodeAlias>>,
    denied: BTreeSet<NodeAlias>,
    timed_out: BTreeSet<NodeAlias>,
    last_denial: Option<String>,
}

impl<K: Ord> Default for ReplyTally<K> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            denied: BTreeSet::new(),
            timed_out: BTreeSet::new(),
            last_denial: None,
        }
    }
}

impl<K: Ord + Clone> ReplyTally<K> {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `alias` already replied or was denied.
    pub fn has_answered(&self, alias: &str) -> bool {
        self.denied.contains(alias) || self.buckets.values().any(|b| b.contains(alias))
    }

    /// Count `alias` for `key`. Returns `false` for an alias already counted.
    pub fn record(&mut self, alias: &str, key: K) -> bool {
        if self.has_answered(alias) {
            return false;
        }
        self.timed_out.remove(alias);
        self.buckets.entry(key).or_default().insert(alias.to_string());
        true
    }

    /// Mark `alias` as having refused or sent garbage.
    pub fn deny(&mut self, alias: &str, reason: impl Into<String>) -> bool {
        if self.has_answered(alias) {
            return false;
        }
        self.timed_out.remove(alias);
        self.denied.insert(alias.to_string());
        self.last_denial = Some(reason.into());
        true
    }

    /// Mark `alias` as silent past its deadline.
    pub fn time_out(&mut self, alias: &str) -> bool {
        if self.has_answered(alias) {
            return false;
        }
        self.timed_out.insert(alias.to_string())
    }

    /// Size of the largest bucket.
    pub fn max_count(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).max().unwrap_or(0)
    }

    /// Replies counted across every bucket.
    pub fn sum(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    /// Number of denied aliases.
    pub fn denied_count(&self) -> usize {
        self.denied.len()
    }

    /// Number of aliases currently timed out.
    pub fn timeout_count(&self) -> usize {
        self.timed_out.len()
    }

    /// Aliases that neither replied, were denied nor timed out, out of `n`.
    pub fn unanswered(&self, n: usize) -> usize {
        n.saturating_sub(self.sum() + self.denied.len() + self.timed_out.len())
    }

    /// Whether any node replied or was denied.
    pub fn heard_from_anyone(&self) -> bool {
        self.sum() > 0 || !self.denied.is_empty()
    }

    /// Reason of the most recent denial.
    pub fn last_denial(&self) -> Option<&str> {
        self.last_denial.as_deref()
    }

    /// Key of the largest bucket when it holds at least `threshold` nodes.
    pub fn leader(&self, threshold: usize) -> Option<&K> {
        self.buckets
            .iter()
            .filter(|(_, aliases)| !aliases.is_empty() && aliases.len() >= threshold)
            .max_by_key(|(_, aliases)| aliases.len())
            .map(|(key, _)| key)
    }

    /// Whether the bucket of `key` holds more than `f` nodes.
    pub fn is_decided(&self, key: &K, f: usize) -> bool {
        self.buckets.get(key).is_some_and(|b| b.len() > f)
    }

    /// Whether a bucket can still exceed `f` with `n` validators.
    pub fn is_reachable(&self, n: usize, f: usize) -> bool {
        let open = (n + self.max_count()) as i64
            - (self.sum() + self.timed_out.len() + self.denied.len()) as i64;
        open > f as i64
    }
}
