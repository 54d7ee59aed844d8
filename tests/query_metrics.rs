use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use fequery::cache::{
    InvalidationRegistry, MutationKind, QueryCache, QueryCacheConfig, QueryKey, QueryStatus,
};
use fequery::infra::telemetry;
use fequery::mutation::MutationRunner;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tokio::sync::oneshot;

#[derive(Debug, Clone, thiserror::Error)]
#[error("rejected")]
struct Rejected;

fn counters(snapshotter: &Snapshotter) -> HashMap<String, u64> {
    let mut totals = HashMap::new();
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        if let DebugValue::Counter(count) = value {
            *totals.entry(key.key().name().to_string()).or_insert(0) += count;
        }
    }
    totals
}

#[tokio::test]
async fn query_and_mutation_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let cache = QueryCache::from_current(QueryCacheConfig::default()).expect("runtime");
    let key = QueryKey::new("gated");

    // Each fetch waits on its own gate so the test controls completion order.
    let gates: Arc<Mutex<Vec<oneshot::Sender<u32>>>> = Arc::default();
    let fetch = {
        let gates = Arc::clone(&gates);
        move || {
            let (tx, rx) = oneshot::channel();
            gates.lock().expect("gates").push(tx);
            async move { Ok::<_, Infallible>(rx.await.unwrap_or_default()) }
        }
    };

    let first = cache.subscribe(key.clone(), fetch.clone());
    let joined = cache.subscribe(key.clone(), fetch.clone());
    assert_eq!(first.snapshot().status, QueryStatus::Loading);

    // Invalidating the in-flight entry supersedes it on the next subscribe.
    cache.invalidate(&key);
    let latest = cache.subscribe(key.clone(), fetch);

    // Fetch functions run on the spawned tasks; let both register a gate.
    while gates.lock().expect("gates").len() < 2 {
        tokio::task::yield_now().await;
    }
    let senders: Vec<_> = gates.lock().expect("gates").drain(..).collect();
    assert_eq!(senders.len(), 2);
    let mut senders = senders.into_iter();
    let stale_gate = senders.next().expect("first gate");
    let fresh_gate = senders.next().expect("second gate");

    fresh_gate.send(2).expect("second fetch alive");
    let settled = latest.settled().await;
    assert_eq!(settled.data.as_deref(), Some(&2));

    stale_gate.send(1).expect("first fetch alive");
    // Let the superseded completion land before reading the snapshot.
    for _ in 0..50 {
        if counters(&snapshotter).contains_key("fequery_query_discarded_total") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(joined.snapshot().data.as_deref(), Some(&2));

    let registry = Arc::new(InvalidationRegistry::new());
    let ok = MutationRunner::new(
        MutationKind::new("save"),
        cache.clone(),
        Arc::clone(&registry),
        |value: u32| async move { Ok::<_, Rejected>(value) },
    );
    ok.run(7).await.expect("save");
    let failing = MutationRunner::new(
        MutationKind::new("reject"),
        cache.clone(),
        registry,
        |_: u32| async move { Err::<u32, _>(Rejected) },
    );
    failing.run(7).await.expect_err("reject");

    let totals = counters(&snapshotter);
    assert_eq!(totals.get("fequery_query_fetch_total"), Some(&2));
    assert_eq!(totals.get("fequery_query_dedup_total"), Some(&1));
    assert_eq!(totals.get("fequery_query_discarded_total"), Some(&1));
    assert_eq!(totals.get("fequery_mutation_total"), Some(&2));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();
    for expected in [
        "fequery_query_fetch_total",
        "fequery_query_dedup_total",
        "fequery_query_discarded_total",
        "fequery_query_fetch_ms",
        "fequery_query_entries",
        "fequery_mutation_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }

    drop((first, joined, latest));
}
