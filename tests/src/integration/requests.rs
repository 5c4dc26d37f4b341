//! Ledger requests against a synced pool: consensus writes, reads trusted
//! from one state proof, stale proofs, rejections and addressed requests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use lp_04_pool::testing::{reject, reply, reqack};
    use serde_json::{json, Value};
    use shared_types::{NodeAlias, PoolError};
    use tokio::time::timeout;

    use crate::integration::fixtures::{cred_def_request, proven_cred_def, unix_now, SimulatedPool, WAIT};

    /// Nodes sent a message containing `needle`, once at least `count` have.
    async fn recipients(pool: &SimulatedPool, needle: &str, count: usize) -> BTreeSet<NodeAlias> {
        timeout(WAIT, async {
            loop {
                let seen: BTreeSet<NodeAlias> = pool
                    .connector
                    .sent()
                    .into_iter()
                    .filter(|m| m.message.contains(needle))
                    .map(|m| m.alias)
                    .collect();
                if seen.len() >= count {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("request sent in time")
    }

    #[tokio::test]
    async fn test_write_decided_by_matching_replies() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        let result = json!({"reqId": 21, "type": "1", "seqNo": 30, "txnTime": 1000});
        pool.answer(&["Node1"], "\"reqId\":21", reqack(21));
        pool.answer(&["Node4"], "\"reqId\":21", reject(21, "client request invalid"));
        pool.answer(&["Node1", "Node3"], "\"reqId\":21", reply(result));

        let answer = pool
            .handle
            .send_request(json!({"reqId": 21, "operation": {"type": "1", "dest": "did"}}).to_string())
            .await
            .unwrap();
        assert!(answer.contains("\"seqNo\":30"));
        assert_eq!(recipients(&pool, "\"reqId\":21", 4).await.len(), 4);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_rejected_everywhere_is_unreachable() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        pool.answer(&["Node1", "Node2", "Node3"], "\"reqId\":22", reject(22, "insufficient fees"));
        let result = pool
            .handle
            .send_request(json!({"reqId": 22, "operation": {"type": "1"}}).to_string())
            .await;
        match result {
            Err(PoolError::QuorumUnreachable(reason)) => assert!(reason.contains("insufficient fees")),
            other => panic!("unexpected {other:?}"),
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn test_read_trusted_from_one_proof() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        let handle = pool.handle.clone();
        let reading = tokio::spawn(async move { handle.send_request(cred_def_request(31).to_string()).await });
        let first = pool.first_recipient("\"reqId\":31").await;
        let signers: Vec<_> = pool.signers.iter().collect();
        let result = proven_cred_def(&signers, 31, unix_now());
        assert!(pool.connector.deliver(&first, &reply(result)));

        let answer = timeout(WAIT, reading).await.unwrap().unwrap().unwrap();
        let answer: Value = serde_json::from_str(&answer).unwrap();
        assert_eq!(answer["result"]["seqNo"], 5);
        assert!(recipients(&pool, "\"reqId\":31", 1).await.len() <= 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_stale_proof_needs_a_second_reply() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        let handle = pool.handle.clone();
        let reading = tokio::spawn(async move { handle.send_request(cred_def_request(32).to_string()).await });
        let signers: Vec<_> = pool.signers.iter().collect();
        // older than the freshness threshold
        let stale = reply(proven_cred_def(&signers, 32, unix_now() - 3_600));

        let asked: Vec<NodeAlias> = recipients(&pool, "\"reqId\":32", 2).await.into_iter().collect();
        assert!(pool.connector.deliver(&asked[0], &stale));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reading.is_finished());

        assert!(pool.connector.deliver(&asked[1], &stale));
        let answer = timeout(WAIT, reading).await.unwrap().unwrap().unwrap();
        assert!(answer.contains("state_proof"));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_addressed_request_collects_every_answer() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        pool.answer(&["Node1"], "\"reqId\":41", reply(json!({"reqId": 41, "data": "info-1"})));
        let body = pool
            .handle
            .send_request_with(
                json!({"reqId": 41, "operation": {"type": "119"}}).to_string(),
                Some(Duration::from_millis(300)),
                Some(vec!["Node1".into(), "Node3".into()]),
            )
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["Node3"], "timeout");
        assert!(body["Node1"].as_str().unwrap().contains("info-1"));
        assert!(pool.connector.sent_to("Node2").iter().all(|m| !m.contains("\"reqId\":41")));

        pool.close().await;
    }

    #[tokio::test]
    async fn test_unanswered_write_times_out() {
        let pool = SimulatedPool::open();
        pool.sync().await;

        let result = pool
            .handle
            .send_request_with(
                json!({"reqId": 51, "operation": {"type": "1"}}).to_string(),
                Some(Duration::from_millis(200)),
                None,
            )
            .await;
        assert!(matches!(result, Err(PoolError::QuorumUnreachable(_)) | Err(PoolError::Timeout)));

        pool.close().await;
    }
}
