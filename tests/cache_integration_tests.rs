//! Integration tests for the multi-layer cache core
//!
//! Covers:
//! - Set/get round trips across layers
//! - Promotion from the Shared layer into the Fast layer
//! - Tag index consistency and tag-based removal
//! - Statistics (hit ratio, residency, idempotent removal)
//! - Degradation when the Shared layer is unavailable

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stockroom_cache::cache::{
    CacheConfig, CacheContext, CacheLayer, CachePriority, DistributedStore,
    InMemoryDistributedStore, MultiLayerCache, StrategyAdvisor,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: i64,
    sku: String,
    name: String,
    price: f64,
    tags: Vec<String>,
}

fn product(id: i64) -> Product {
    Product {
        id,
        sku: format!("SKU-{}", id),
        name: format!("Product {}", id),
        price: 9.99,
        tags: vec!["hardware".to_string()],
    }
}

fn setup() -> (MultiLayerCache, Arc<InMemoryDistributedStore>) {
    let shared = Arc::new(InMemoryDistributedStore::new());
    let config = CacheConfig::builder()
        .default_ttl(Duration::from_secs(3600))
        .ttl_jitter(0.0)
        .build();
    (MultiLayerCache::new(config, shared.clone()), shared)
}

#[tokio::test]
async fn test_round_trip_for_every_layer() {
    let (cache, _) = setup();

    for (i, layer) in CacheLayer::ALL.iter().enumerate() {
        let key = format!("product_{}", i);
        let value = product(i as i64);
        assert!(cache.set(&key, &value, None, *layer).await);
        assert_eq!(cache.get::<Product>(&key).await, Some(value));
    }

    cache.set("label", &"plain string", None, CacheLayer::Fast).await;
    assert_eq!(cache.get::<String>("label").await.as_deref(), Some("plain string"));

    cache.set("counts", &vec![1u32, 2, 3], None, CacheLayer::Shared).await;
    assert_eq!(cache.get::<Vec<u32>>("counts").await, Some(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_promotion_survives_shared_outage() {
    let (cache, shared) = setup();
    let value = serde_json::to_string(&product(7)).unwrap();
    shared
        .set("product_7", value, Duration::from_secs(3600))
        .await
        .unwrap();
    assert!(!cache.fast_layer().contains_key("product_7").await);

    assert_eq!(cache.get::<Product>("product_7").await, Some(product(7)));
    assert!(cache.fast_layer().contains_key("product_7").await);
    assert_eq!(cache.statistics().promotions, 1);

    shared.set_available(false);
    assert_eq!(cache.get::<Product>("product_7").await, Some(product(7)));

    let stats = cache.statistics();
    assert_eq!(stats.shared.hits, 1);
    assert_eq!(stats.fast.hits, 1);
}

#[tokio::test]
async fn test_promoted_copy_uses_short_expiration() {
    let shared = Arc::new(InMemoryDistributedStore::new());
    let config = CacheConfig::builder()
        .promotion_ttl(Duration::from_millis(50))
        .build();
    let cache = MultiLayerCache::new(config, shared.clone());

    shared
        .set("k", "\"v\"".to_string(), Duration::from_secs(3600))
        .await
        .unwrap();
    cache.get::<String>("k").await;
    assert!(cache.fast_layer().contains_key("k").await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.fast_layer().contains_key("k").await);
    assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn test_expired_entries_are_absent() {
    let (cache, shared) = setup();
    cache
        .set("flash", &1, Some(Duration::from_millis(50)), CacheLayer::Shared)
        .await;
    assert!(cache.exists("flash").await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.exists("flash").await);
    assert_eq!(cache.get::<i32>("flash").await, None);
    assert!(shared.get("flash").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_by_tag_removes_exactly_the_tagged_set() {
    let (cache, shared) = setup();
    for key in ["a", "b", "c", "d"] {
        cache.set(key, &key, None, CacheLayer::Shared).await;
    }
    for key in ["a", "b", "c"] {
        cache.set_tag(key, "products");
    }

    assert_eq!(cache.remove_by_tag("products").await, 3);

    for key in ["a", "b", "c"] {
        assert!(!cache.fast_layer().contains_key(key).await);
        assert!(!shared.exists(key).await.unwrap());
        assert_eq!(cache.get::<String>(key).await, None);
    }
    assert_eq!(cache.get::<String>("d").await.as_deref(), Some("d"));
    assert!(cache.tag_index().keys_for("products").is_empty());
    assert!(cache.tag_index().is_consistent());
}

#[tokio::test]
async fn test_tag_index_consistent_after_mixed_operations() {
    let (cache, _) = setup();

    for i in 0..30 {
        let key = format!("key_{}", i);
        cache.set(&key, &i, None, CacheLayer::Fast).await;
        cache.set_tag(&key, &format!("group_{}", i % 4));
        cache.set_tag(&key, "all");
        cache.set_tag(&key, "all");
        if i % 5 == 0 {
            cache.remove(&key).await;
        }
        if i % 11 == 0 {
            cache.remove_by_tag(&format!("group_{}", i % 4)).await;
        }
        assert!(cache.tag_index().is_consistent());
    }

    cache.remove_by_tag("all").await;
    assert!(cache.tag_index().is_consistent());
    assert_eq!(cache.tag_index().key_count(), 0);
    assert_eq!(cache.tag_index().tag_count(), 0);
}

#[tokio::test]
async fn test_tag_index_consistent_under_concurrency() {
    let (cache, _) = setup();
    let cache = Arc::new(cache);

    let tasks: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let key = format!("key_{}", i % 10);
                    cache.set(&key, &i, None, CacheLayer::Fast).await;
                    cache.set_tag(&key, &format!("tag_{}", t % 3));
                    match i % 6 {
                        0 => {
                            cache.remove(&key).await;
                        }
                        3 => {
                            cache.remove_by_tag(&format!("tag_{}", (t + 1) % 3)).await;
                        }
                        _ => {}
                    }
                }
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    assert!(cache.tag_index().is_consistent());
}

#[tokio::test]
async fn test_remove_twice_is_idempotent() {
    let (cache, _) = setup();
    cache.set("a", &1, None, CacheLayer::Shared).await;
    cache.set("b", &2, None, CacheLayer::Shared).await;
    cache.set_tag("a", "numbers");
    assert_eq!(cache.statistics().fast_entries, 2);

    assert!(cache.remove("a").await);
    assert!(!cache.remove("a").await);

    let stats = cache.statistics();
    assert_eq!(stats.fast_entries, 1);
    assert_eq!(stats.tag_count, 0);
    assert_eq!(stats.fast_size_bytes as usize, cache.fast_layer().size_bytes().await);
}

#[tokio::test]
async fn test_hit_ratio_three_hits_one_miss() {
    let (cache, _) = setup();
    cache.set("k", &"v", None, CacheLayer::Fast).await;

    for _ in 0..3 {
        assert!(cache.get::<String>("k").await.is_some());
    }
    cache.remove("k").await;
    assert!(cache.get::<String>("k").await.is_none());

    let stats = cache.statistics();
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.total_misses, 1);
    assert!((stats.hit_ratio - 0.75).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_hit_ratio_zero_without_traffic() {
    let (cache, _) = setup();
    assert_eq!(cache.statistics().hit_ratio, 0.0);
}

#[tokio::test]
async fn test_key_statistics_and_reset() {
    let (cache, _) = setup();
    cache.set("k", &1, None, CacheLayer::Fast).await;
    cache.get::<i32>("k").await;
    cache.get::<i32>("k").await;
    cache.get::<i32>("missing").await;

    let stats = cache.key_statistics("k").unwrap();
    assert_eq!(stats.hit_count, 2);
    assert_eq!(stats.miss_count, 0);
    assert_eq!(cache.key_statistics("missing").unwrap().miss_count, 1);

    cache.reset_statistics();
    assert!(cache.key_statistics("k").is_none());
    assert_eq!(cache.statistics().total_requests(), 0);
    // Residency is unaffected by a statistics reset
    assert_eq!(cache.statistics().fast_entries, 1);
}

#[tokio::test]
async fn test_set_with_tags_and_remove_by_tags() {
    let (cache, _) = setup();
    cache.set_with_tags("p1", &product(1), ["products", "featured"], None).await;
    cache.set_with_tags("p2", &product(2), ["products"], None).await;
    cache.set_with_tags("u1", &"alice", ["users"], None).await;

    assert_eq!(cache.remove_by_tags(&["featured", "users"]).await, 2);
    assert!(!cache.exists("p1").await);
    assert!(!cache.exists("u1").await);
    assert!(cache.exists("p2").await);
    assert!(cache.tag_index().tags_for("p2").contains("products"));
}

#[tokio::test]
async fn test_remove_batch_counts_present_keys() {
    let (cache, _) = setup();
    for key in ["a", "b", "c"] {
        cache.set(key, &key, None, CacheLayer::Shared).await;
    }
    assert_eq!(cache.remove_batch(&["a", "b", "zzz"]).await, 2);
    assert!(cache.exists("c").await);
}

#[tokio::test]
async fn test_shared_outage_degrades_to_single_layer() {
    let (cache, shared) = setup();
    shared.set_available(false);

    assert!(cache.set("p", &product(1), None, CacheLayer::Shared).await);
    assert_eq!(cache.get::<Product>("p").await, Some(product(1)));
    assert_eq!(cache.get::<Product>("absent").await, None);

    shared.set_available(true);
    assert!(!shared.exists("p").await.unwrap());
}

#[tokio::test]
async fn test_get_or_set_populates_once() {
    let (cache, _) = setup();
    let first = cache
        .get_or_set("p", || async { Ok(Some(product(3))) }, None)
        .await;
    assert_eq!(first, Some(product(3)));

    let calls = AtomicUsize::new(0);
    let second = cache
        .get_or_set(
            "p",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(product(4)))
            },
            None,
        )
        .await;
    assert_eq!(second, Some(product(3)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_set_adaptive_places_reports_in_shared() {
    let shared = Arc::new(InMemoryDistributedStore::new());
    let cache = MultiLayerCache::new(CacheConfig::default(), shared.clone())
        .with_advisor(Arc::new(StrategyAdvisor::new()));

    let context = CacheContext::new("SalesReport", "Read");
    assert!(cache.set_adaptive("report_q1", &vec![1, 2, 3], &context).await);

    // Persistent placement writes through the Shared layer
    assert!(shared.exists("report_q1").await.unwrap());
    assert!(cache.fast_layer().contains_key("report_q1").await);
}

#[tokio::test]
async fn test_oversized_ttls_are_clamped_not_rejected() {
    let (cache, shared) = setup();
    let huge = Duration::from_secs(100_000_000_000_000);

    assert!(cache.set("fast_forever", &1, Some(huge), CacheLayer::Fast).await);
    assert!(cache.set("shared_forever", &2, Some(Duration::MAX), CacheLayer::Shared).await);
    assert!(cache.set("persisted_forever", &3, Some(huge), CacheLayer::Persistent).await);

    assert_eq!(cache.get::<i32>("fast_forever").await, Some(1));
    assert!(shared.exists("shared_forever").await.unwrap());
    assert!(shared.exists("persisted_forever").await.unwrap());
    assert_eq!(cache.get::<i32>("shared_forever").await, Some(2));
}

#[tokio::test]
async fn test_get_or_set_places_new_catalog_data_in_shared() {
    let shared = Arc::new(InMemoryDistributedStore::new());
    let cache = MultiLayerCache::new(CacheConfig::default(), shared.clone())
        .with_advisor(Arc::new(StrategyAdvisor::new()));

    let value = cache
        .get_or_set::<Product, _, _>("product_99", || async { Ok(Some(product(99))) }, None)
        .await;

    assert_eq!(value, Some(product(99)));
    assert!(shared.exists("product_99").await.unwrap());
    assert_eq!(cache.get::<Product>("product_99").await, Some(product(99)));
}

#[tokio::test]
async fn test_advisor_tracking_does_not_outlive_removed_keys() {
    let advisor = Arc::new(StrategyAdvisor::new());
    let (cache, _) = setup();
    let cache = cache.with_advisor(advisor.clone());

    for i in 0..5000 {
        cache.get::<u32>(&format!("lookup_{}", i)).await;
    }
    for i in 0..5000 {
        cache.remove(&format!("lookup_{}", i)).await;
    }
    assert_eq!(advisor.tracked_keys(), 0);

    for i in 0..(advisor.max_tracked_keys() * 2) {
        cache.get::<u32>(&format!("scan_{}", i)).await;
    }
    assert!(advisor.tracked_keys() <= advisor.max_tracked_keys());
}

#[tokio::test]
async fn test_advisor_hot_data_is_deterministic() {
    let advisor = StrategyAdvisor::new();
    for i in 0..20 {
        let key = format!("hot_{}", i % 3);
        let context = CacheContext::new("Statistics", "Read")
            .with_access_count(11 + i)
            .hot();

        assert_eq!(advisor.select_cache_layer(&key, &context), CacheLayer::Fast);
        assert_eq!(advisor.get_cache_priority(&key, &context), CachePriority::High);
        advisor.record_access(&key);
    }
}

#[tokio::test]
async fn test_product_42_scenario() {
    let (cache, shared) = setup();
    let product_json = serde_json::json!({"id": 42, "name": "Widget", "price": 4.5});

    cache
        .set(
            "product_42",
            &product_json,
            Some(Duration::from_secs(3600)),
            CacheLayer::Shared,
        )
        .await;

    assert_eq!(cache.get::<serde_json::Value>("product_42").await, Some(product_json.clone()));
    assert_eq!(cache.statistics().fast.hits, 1);

    // Force the Fast copy out; the Shared layer still answers
    cache.fast_layer().remove("product_42").await;
    assert_eq!(cache.get::<serde_json::Value>("product_42").await, Some(product_json));
    assert_eq!(cache.statistics().shared.hits, 1);

    cache.set_tag("product_42", "products");
    cache.remove_by_tag("products").await;

    assert_eq!(cache.get::<serde_json::Value>("product_42").await, None);
    assert!(!cache.fast_layer().contains_key("product_42").await);
    assert!(!shared.exists("product_42").await.unwrap());
}

#[tokio::test]
async fn test_clear_all_flushes_both_layers() {
    let (cache, shared) = setup();
    for i in 0..10 {
        cache.set(&format!("k{}", i), &i, None, CacheLayer::Shared).await;
    }
    cache.get::<i32>("k1").await;

    cache.clear_all().await;

    assert!(shared.is_empty());
    assert!(cache.fast_layer().is_empty().await);
    let stats = cache.statistics();
    assert_eq!(stats.total_requests(), 0);
    assert_eq!(stats.fast_entries, 0);
}
