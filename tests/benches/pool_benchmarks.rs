//! # Ledger Pool Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | lp-03 Ledger view | Build from transactions, consistency proof, prefix check |
//! | lp-01 State proof | Trie walk of one key, full reply verification |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lp_01_state_proof::testing::{sign_state, signed_state_value, test_validators, ProofTrieBuilder};
use lp_01_state_proof::{expected_value, verify_kv, BlsGenerator, ReplyVerifier, StateProofVerifier};
use lp_03_request::LedgerView;
use serde_json::{json, Value};

fn pool_txns(count: usize) -> Vec<Value> {
    (1..=count)
        .map(|seq_no| {
            json!({
                "txn": {"type": "0", "data": {"dest": format!("dest-{seq_no}"), "data": {"alias": format!("Node{seq_no}")}}},
                "txnMetadata": {"seqNo": seq_no},
            })
        })
        .collect()
}

fn bench_ledger_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("lp-03-ledger-view");
    group.measurement_time(Duration::from_secs(5));

    for size in [25, 100, 400] {
        let txns = pool_txns(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("from_txns", size), &txns, |b, txns| {
            b.iter(|| LedgerView::from_txns(black_box(txns.clone())))
        });

        let Ok(full) = LedgerView::from_txns(txns) else {
            continue;
        };
        let old_size = size / 2;
        group.bench_with_input(BenchmarkId::new("consistency_check", size), &full, |b, full| {
            b.iter(|| {
                let proof = full.consistency_proof(old_size);
                black_box(full.is_prefix_of(old_size, &full.root_hash(), &proof))
            })
        });
    }
    group.finish();
}

fn bench_state_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("lp-01-state-proof");
    group.measurement_time(Duration::from_secs(10));

    let key = b"did1:3:CL:10:tag";
    let mut result = json!({"reqId": 1, "type": "108", "seqNo": 5, "txnTime": 6, "data": {"primary": {"n": "1"}}});
    let Ok(Some(stored)) = expected_value("108", key, &result) else {
        return;
    };
    let mut trie = ProofTrieBuilder::new();
    trie.insert(key, &stored);
    for i in 0..64 {
        trie.insert(format!("other{i}:3:CL:10:tag").as_bytes(), "{}");
    }
    let (proof_nodes, root_hash) = trie.encode();

    group.bench_function("verify_kv", |b| {
        b.iter(|| black_box(verify_kv(&proof_nodes, &root_hash, key, Some(stored.as_str()))))
    });

    let generator = BlsGenerator::default();
    let (signers, verkeys) = test_validators(4, &generator);
    let signer_refs: Vec<_> = signers.iter().collect();
    let now = 1_700_000_000;
    result["state_proof"] = json!({
        "proof_nodes": proof_nodes,
        "root_hash": root_hash,
        "multi_signature": sign_state(&signer_refs, signed_state_value(&root_hash, now)),
    });
    let verkeys: Arc<BTreeMap<_, _>> = Arc::new(verkeys);
    let verifier = StateProofVerifier::new(verkeys, 1, generator, Duration::from_secs(600));

    group.bench_function("verify_reply", |b| {
        b.iter(|| black_box(verifier.verify_reply("108", key, &result, now)))
    });
    group.finish();
}

criterion_group!(benches, bench_ledger_view, bench_state_proof);
criterion_main!(benches);
