//! Pool lifecycle through the handle: sync, catch-up, outdated ledger,
//! refresh and close.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use lp_02_networker::MockConnector;
    use lp_03_request::LedgerView;
    use lp_04_pool::testing::{
        catchup_reply, consistency_proof, genesis_text, ledger, ledger_status, node_txn, node_update_txn, reply,
    };
    use lp_04_pool::{PoolConfig, PoolHandle};
    use serde_json::{json, Value};
    use shared_types::PoolError;
    use tokio::time::timeout;

    use crate::integration::fixtures::{SimulatedPool, WAIT};

    /// Ledger grown by a port change for Node2 and a non-validator node.
    fn grown_ledger(pool: &SimulatedPool) -> LedgerView {
        let mut txns = pool.genesis.clone();
        txns.push(node_update_txn(5, 2, json!({"client_port": 9800})));
        txns.push(node_txn(6, 9, "Observer", &[], None));
        ledger(&txns)
    }

    /// Play three validators that hold `full`, then serve the missing range.
    async fn serve_catchup(pool: &SimulatedPool, local: &LedgerView, full: &LedgerView) {
        let proof = consistency_proof(local, full);
        pool.answer(&["Node1", "Node2", "Node3"], "LEDGER_STATUS", proof)
            .await
            .expect("proofs delivered");
        let fetcher = pool.first_recipient("CATCHUP_REQUEST").await;
        let from = local.count() + 1;
        assert!(pool.connector.deliver(&fetcher, &catchup_reply(full, from, full.count())));
    }

    #[tokio::test]
    async fn test_catchup_then_consensus_request() {
        let pool = SimulatedPool::open();
        let local = pool.genesis_view();
        let full = grown_ledger(&pool);

        let handle = pool.handle.clone();
        let opening = tokio::spawn(async move { handle.check_cache().await });
        serve_catchup(&pool, &local, &full).await;

        let body: Value = serde_json::from_str(&timeout(WAIT, opening).await.unwrap().unwrap().unwrap()).unwrap();
        assert_eq!(body, json!({"txnCount": 6, "merkleRoot": full.root_hash_b58()}));

        let result = json!({"reqId": 77, "type": "1", "seqNo": 12, "txnTime": 1000});
        pool.answer(&["Node2", "Node4"], "\"reqId\":77", reply(result));
        let answer = pool
            .handle
            .send_request(json!({"reqId": 77, "operation": {"type": "1", "dest": "did"}}).to_string())
            .await
            .unwrap();
        assert!(answer.contains("\"seqNo\":12"));
        assert!(pool.connector.sent_to("Observer").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn test_outdated_ledger_needs_refresh() {
        let pool = SimulatedPool::open();
        pool.sync().await;
        let local = pool.genesis_view();
        let full = grown_ledger(&pool);

        let handle = pool.handle.clone();
        let waiting = tokio::spawn(async move {
            handle
                .send_request(json!({"reqId": 5, "operation": {"type": "1"}}).to_string())
                .await
        });
        pool.first_recipient("\"reqId\":5").await;
        let status = ledger_status(&full);
        assert!(pool.connector.deliver("Node3", &status));
        assert!(pool.connector.deliver("Node4", &status));
        let result = timeout(WAIT, waiting).await.unwrap().unwrap();
        assert!(matches!(result, Err(PoolError::Terminated(_))));

        let refused = pool.handle.send_request(json!({"reqId": 6}).to_string()).await;
        assert!(matches!(refused, Err(PoolError::InvalidState { state: "Terminated", .. })));

        pool.connector.take_sent();
        let handle = pool.handle.clone();
        let refreshing = tokio::spawn(async move { handle.refresh().await });
        serve_catchup(&pool, &local, &full).await;
        let body = timeout(WAIT, refreshing).await.unwrap().unwrap().unwrap();
        assert!(body.contains("\"txnCount\":6"));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_silent_pool_is_unreachable() {
        let pool = SimulatedPool::open();
        let result = pool.handle.check_cache().await;
        assert!(matches!(result, Err(PoolError::QuorumUnreachable(_))));

        let refused = pool.handle.send_request(json!({"reqId": 1}).to_string()).await;
        assert!(matches!(refused, Err(PoolError::InvalidState { .. })));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_refresh_while_active_resyncs() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        pool.connector.take_sent();
        let status = ledger_status(&pool.genesis_view());
        pool.answer(&["Node2", "Node3", "Node4"], "LEDGER_STATUS", status);
        let body = pool.handle.refresh().await.unwrap();
        assert!(body.contains("\"txnCount\":4"));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_commands() {
        let pool = SimulatedPool::open();
        let handle = pool.handle.clone();
        pool.close().await;

        assert!(matches!(handle.check_cache().await, Err(PoolError::Terminated(_))));
    }

    #[tokio::test]
    async fn test_open_from_genesis_file() {
        let (_, verkeys) = lp_01_state_proof::testing::test_validators(4, &Default::default());
        let txns = lp_04_pool::testing::validator_txns(&verkeys);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", genesis_text(&txns)).unwrap();

        let connector = MockConnector::new();
        let (handle, task) =
            PoolHandle::open_genesis_file(file.path(), PoolConfig::for_testing(), Arc::new(connector.clone())).unwrap();

        let status = ledger_status(&ledger(&txns));
        let answering = {
            let connector = connector.clone();
            tokio::spawn(async move {
                for alias in ["Node1", "Node3", "Node4"] {
                    crate::integration::fixtures::wait_sent(&connector, alias, "LEDGER_STATUS").await;
                    connector.deliver(alias, &status);
                }
            })
        };
        let body = handle.check_cache().await.unwrap();
        answering.await.unwrap();
        assert!(body.contains("\"txnCount\":4"));

        assert_eq!(handle.close().await, Ok(String::new()));
        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
