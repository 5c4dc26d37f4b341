//! Simulated validator pool behind a `MockConnector`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lp_01_state_proof::testing::{sign_state, signed_state_value, test_validators, BlsTestSigner, ProofTrieBuilder};
use lp_01_state_proof::{expected_value, BlsGenerator, MultiSignature};
use lp_02_networker::MockConnector;
use lp_03_request::LedgerView;
use lp_04_pool::testing::{genesis_text, ledger, ledger_status, validator_txns};
use lp_04_pool::{PoolConfig, PoolHandle};
use serde_json::{json, Value};
use shared_types::NodeAlias;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Four validators `Node1..Node4` and a pool opened over their genesis.
pub struct SimulatedPool {
    pub handle: PoolHandle,
    pub task: JoinHandle<()>,
    pub connector: MockConnector,
    pub signers: Vec<(NodeAlias, BlsTestSigner)>,
    pub genesis: Vec<Value>,
}

impl SimulatedPool {
    pub fn open() -> Self {
        Self::open_with(PoolConfig::for_testing())
    }

    pub fn open_with(config: PoolConfig) -> Self {
        let (signers, verkeys) = test_validators(4, &BlsGenerator::default());
        let genesis = validator_txns(&verkeys);
        let connector = MockConnector::new();
        let (handle, task) =
            PoolHandle::open(genesis_text(&genesis), config, Arc::new(connector.clone())).expect("pool opens");
        Self { handle, task, connector, signers, genesis }
    }

    pub fn genesis_view(&self) -> LedgerView {
        ledger(&self.genesis)
    }

    /// Answer the first `LEDGER_STATUS` of three nodes with an unchanged ledger.
    pub async fn sync(&self) -> String {
        let status = ledger_status(&self.genesis_view());
        let answers = self.answer(&["Node1", "Node2", "Node3"], "LEDGER_STATUS", status);
        let synced = self.handle.check_cache().await.expect("pool syncs");
        answers.await.expect("answers delivered");
        synced
    }

    /// Deliver `payload` from each of `aliases` once it has been sent a
    /// message containing `needle`.
    pub fn answer(&self, aliases: &[&str], needle: &str, payload: String) -> JoinHandle<()> {
        let connector = self.connector.clone();
        let aliases: Vec<String> = aliases.iter().map(|a| a.to_string()).collect();
        let needle = needle.to_string();
        tokio::spawn(async move {
            for alias in aliases {
                wait_sent(&connector, &alias, &needle).await;
                assert!(connector.deliver(&alias, &payload), "{alias} has a channel");
            }
        })
    }

    /// Alias of the first node sent a message containing `needle`.
    pub async fn first_recipient(&self, needle: &str) -> NodeAlias {
        timeout(WAIT, async {
            loop {
                if let Some(sent) = self.connector.sent().into_iter().find(|m| m.message.contains(needle)) {
                    return sent.alias;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("message sent in time")
    }

    /// Close the pool and wait for its task.
    pub async fn close(self) {
        assert_eq!(self.handle.close().await, Ok(String::new()));
        timeout(WAIT, self.task).await.expect("pool task stops").expect("pool task ran");
    }
}

/// Wait until `alias` has been sent a message containing `needle`.
pub async fn wait_sent(connector: &MockConnector, alias: &str, needle: &str) -> String {
    timeout(WAIT, async {
        loop {
            if let Some(message) = connector.sent_to(alias).into_iter().find(|m| m.contains(needle)) {
                return message;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("message sent in time")
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// `GET_CRED_DEF` request for `did1:3:CL:10:tag`.
pub fn cred_def_request(req_id: u64) -> Value {
    json!({
        "reqId": req_id,
        "operation": {"type": "108", "origin": "did1", "signature_type": "CL", "ref": 10, "tag": "tag"},
    })
}

/// `GET_CRED_DEF` result with a state proof signed by `signers` at `signed_at`.
pub fn proven_cred_def(signers: &[&(NodeAlias, BlsTestSigner)], req_id: u64, signed_at: u64) -> Value {
    let key = b"did1:3:CL:10:tag";
    let mut result = json!({
        "reqId": req_id,
        "type": "108",
        "seqNo": 5,
        "txnTime": signed_at,
        "data": {"primary": {"n": "1"}},
    });
    let stored = expected_value("108", key, &result)
        .expect("result encodes")
        .expect("result has data");
    let mut trie = ProofTrieBuilder::new();
    trie.insert(key, &stored);
    let (proof_nodes, root_hash) = trie.encode();
    let multi_signature: MultiSignature = sign_state(signers, signed_state_value(&root_hash, signed_at));
    result["state_proof"] = json!({
        "proof_nodes": proof_nodes,
        "root_hash": root_hash,
        "multi_signature": multi_signature,
    });
    result
}
