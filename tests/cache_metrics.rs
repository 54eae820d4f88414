use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use querycache::{BoxError, CacheConfig, CacheManager, Endpoint, EvictionPolicy};
use serde_json::json;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let config = CacheConfig {
        eviction: EvictionPolicy::Lru,
        max_entries: Some(1),
        ..CacheConfig::default()
    };
    let manager = Arc::new(CacheManager::from_config(&config).expect("valid config"));
    manager.register(
        "post",
        Endpoint::query(|args| async move { Ok::<_, BoxError>(json!({ "id": args[0] })) })
            .with_tags(|args, _| vec![format!("post:{}", args[0])]),
    );

    // miss, hit, then a second key evicts the first
    for id in [1, 1, 2] {
        manager
            .execute_endpoint("post", vec![json!(id)], None)
            .await
            .expect("query should succeed");
    }
    manager.invalidate(&["post:2".to_string()]);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "querycache_hit_total",
        "querycache_miss_total",
        "querycache_evict_total",
        "querycache_invalidated_total",
        "querycache_subscriptions",
        "querycache_request_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let misses = snapshot
        .iter()
        .find_map(|(composite_key, _, _, value)| {
            (composite_key.key().name() == "querycache_miss_total").then(|| value.clone())
        })
        .expect("miss counter is recorded");
    assert_eq!(*misses, DebugValue::Counter(2));
}
