//! Multi-layer cache core
//!
//! Lookups cascade Fast -> Shared -> Persistent. A Shared hit is promoted into
//! the Fast layer with the configured short expiration. Writes with Shared or
//! Persistent preference go to the Shared layer and are mirrored into the Fast
//! layer before returning, so a `set` followed by `get` on the same task always
//! observes the written value.
//!
//! The Persistent layer is a counted placeholder: lookups never reach storage,
//! they only record a miss.
//!
//! Every public operation degrades instead of failing: Shared-layer errors
//! become misses on read and are skipped on write, serialization errors are
//! logged and the operation becomes a no-op.

use crate::cache::{
    config::CacheConfig,
    distributed::DistributedStore,
    entry::{serialized_size, CacheEntry},
    store::{EvictionCause, EvictionListener, MemoryStore},
    strategy::{CacheContext, StrategyAdvisor},
    tag_index::TagIndex,
    types::{AccessStatistics, CacheKey, CacheLayer, CacheStatistics, CacheValue, LayerStats},
};
use crate::error::Result;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Hit/miss and residency counters shared with the Fast layer listener
#[derive(Debug, Default)]
struct LayerCounters {
    fast_hits: AtomicU64,
    fast_misses: AtomicU64,
    shared_hits: AtomicU64,
    shared_misses: AtomicU64,
    persistent_misses: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    evictions: AtomicU64,

    // Signed: a listener decrement can race ahead of the matching increment
    resident_entries: AtomicI64,
    resident_bytes: AtomicI64,
}

impl LayerCounters {
    fn admit(&self, size: usize) {
        self.resident_entries.fetch_add(1, Ordering::Relaxed);
        self.resident_bytes.fetch_add(size as i64, Ordering::Relaxed);
    }

    fn release(&self, entry: &CacheEntry, cause: EvictionCause) {
        self.resident_entries.fetch_sub(1, Ordering::Relaxed);
        self.resident_bytes
            .fetch_sub(entry.size_estimate as i64, Ordering::Relaxed);
        if cause.is_eviction() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn reset_traffic(&self) {
        for counter in [
            &self.fast_hits,
            &self.fast_misses,
            &self.shared_hits,
            &self.shared_misses,
            &self.persistent_misses,
            &self.hits,
            &self.misses,
            &self.promotions,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// Fast + Shared (+ placeholder Persistent) cache with tag-based invalidation
pub struct MultiLayerCache {
    config: CacheConfig,
    fast: Arc<MemoryStore>,
    shared: Arc<dyn DistributedStore>,
    tags: TagIndex,
    counters: Arc<LayerCounters>,
    key_stats: DashMap<CacheKey, AccessStatistics>,
    advisor: Option<Arc<StrategyAdvisor>>,
}

impl MultiLayerCache {
    /// Create a cache over the given Shared layer client
    pub fn new(config: CacheConfig, shared: Arc<dyn DistributedStore>) -> Self {
        info!(
            "Initializing multi-layer cache (default ttl: {:?}, promotion ttl: {:?})",
            config.default_ttl, config.promotion_ttl
        );

        let counters = Arc::new(LayerCounters::default());
        let sink = counters.clone();
        let listener: EvictionListener = Arc::new(move |entry: &CacheEntry, cause: EvictionCause| {
            sink.release(entry, cause);
        });

        Self {
            fast: Arc::new(MemoryStore::with_listener(config.clone(), listener)),
            config,
            shared,
            tags: TagIndex::new(),
            counters,
            key_stats: DashMap::new(),
            advisor: None,
        }
    }

    /// Attach a strategy advisor used for placement on miss
    pub fn with_advisor(mut self, advisor: Arc<StrategyAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fast_layer(&self) -> &Arc<MemoryStore> {
        &self.fast
    }

    pub fn shared_layer(&self) -> &Arc<dyn DistributedStore> {
        &self.shared
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    pub fn advisor(&self) -> Option<&Arc<StrategyAdvisor>> {
        self.advisor.as_ref()
    }

    /// Typed read; a payload that no longer deserializes is treated as absent
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        decode(key, &raw)
    }

    /// Read the serialized payload through the layer cascade
    pub async fn get_raw(&self, key: &str) -> Option<CacheValue> {
        let value = self.read_through(key).await;
        self.note_access(key);
        value
    }

    async fn read_through(&self, key: &str) -> Option<CacheValue> {
        let started = Instant::now();

        if let Some(value) = self.fast.get(key).await {
            self.counters.fast_hits.fetch_add(1, Ordering::Relaxed);
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit (fast): {}", key);
            self.record_key(key, true, started);
            return Some(value);
        }
        self.counters.fast_misses.fetch_add(1, Ordering::Relaxed);

        match self.shared.get(key).await {
            Ok(Some(value)) => {
                self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit (shared): {}", key);
                self.promote(key, &value).await;
                self.record_key(key, true, started);
                return Some(value);
            }
            Ok(None) => {
                self.counters.shared_misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Shared layer read failed for {}, treating as miss: {}", key, e);
                self.counters.shared_misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.counters.persistent_misses.fetch_add(1, Ordering::Relaxed);
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss: {}", key);
        self.record_key(key, false, started);
        None
    }

    /// Serialize and write `value` according to the preferred layer
    ///
    /// Returns whether the value is now readable from this process.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        layer: CacheLayer,
    ) -> bool {
        match serde_json::to_string(value) {
            Ok(payload) => self.set_raw(key, payload, ttl, layer).await,
            Err(e) => {
                warn!("Failed to serialize value for {}: {}", key, e);
                false
            }
        }
    }

    /// Write an already serialized payload
    pub async fn set_raw(
        &self,
        key: &str,
        payload: CacheValue,
        ttl: Option<Duration>,
        layer: CacheLayer,
    ) -> bool {
        let ttl = self
            .config
            .ttl_with_jitter(ttl.unwrap_or(self.config.default_ttl));

        match layer {
            CacheLayer::Fast => self.write_fast(key, payload, ttl).await,
            CacheLayer::Shared | CacheLayer::Persistent => {
                if let Err(e) = self.shared.set(key, payload.clone(), ttl).await {
                    warn!("Shared layer write failed for {}, keeping fast copy only: {}", key, e);
                }
                // The mirror never outlives the authoritative copy
                let mirror_ttl = ttl.min(self.config.promotion_ttl);
                self.write_fast(key, payload, mirror_ttl).await
            }
        }
    }

    /// Write to the default layer and attach tags
    pub async fn set_with_tags<T, I, S>(
        &self,
        key: &str,
        value: &T,
        tags: I,
        ttl: Option<Duration>,
    ) -> bool
    where
        T: Serialize + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.set(key, value, ttl, self.config.default_layer).await {
            return false;
        }
        for tag in tags {
            self.set_tag(key, tag.as_ref());
        }
        true
    }

    /// Write with layer and expiration chosen by the strategy advisor
    ///
    /// Without an attached advisor the advisor's safe defaults apply.
    pub async fn set_adaptive<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        context: &CacheContext,
    ) -> bool {
        let (layer, ttl) = match &self.advisor {
            Some(advisor) => (
                advisor.select_cache_layer(key, context),
                advisor.calculate_expiration(key, context),
            ),
            None => (
                StrategyAdvisor::SAFE_DEFAULT.layer,
                StrategyAdvisor::SAFE_DEFAULT.expiration,
            ),
        };
        self.set(key, value, Some(ttl), layer).await
    }

    /// Return the cached value or populate it from `factory`
    ///
    /// On miss the advisor (if attached) chooses the layer and, when `ttl` is
    /// `None`, the expiration. Factory errors are logged and yield `None`.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, factory: F, ttl: Option<Duration>) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let cached = match self.read_through(key).await {
            Some(raw) => decode::<T>(key, &raw),
            None => None,
        };
        if cached.is_some() {
            self.note_access(key);
            return cached;
        }

        let filled = self.fill(key, factory, ttl).await;
        // After placement, so the miss itself does not count as recent use
        self.note_access(key);
        filled
    }

    async fn fill<T, F, Fut>(&self, key: &str, factory: F, ttl: Option<Duration>) -> Option<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let value = match factory().await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("Factory for {} failed: {}", key, e);
                return None;
            }
        };

        let (layer, ttl) = self.placement::<T>(key, ttl, serialized_size(&value));
        self.set(key, &value, ttl, layer).await;
        Some(value)
    }

    /// Remove a key from every layer, its statistics, the tag index and the
    /// advisor's access tracking
    ///
    /// Returns whether any layer held the key.
    pub async fn remove(&self, key: &str) -> bool {
        let fast_removed = self.fast.remove(key).await.is_some();
        let shared_removed = match self.shared.remove(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Shared layer remove failed for {}: {}", key, e);
                false
            }
        };

        self.key_stats.remove(key);
        self.tags.remove_key(key);
        if let Some(advisor) = &self.advisor {
            advisor.forget_access(key);
        }

        debug!("Cache remove: {} (fast: {}, shared: {})", key, fast_removed, shared_removed);
        fast_removed || shared_removed
    }

    /// Remove many keys concurrently, returning how many were present
    pub async fn remove_batch<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        let results = join_all(keys.iter().map(|key| self.remove(key.as_ref()))).await;
        results.into_iter().filter(|removed| *removed).count()
    }

    /// Remove every key carrying `tag`, then drop the tag
    ///
    /// Not atomic across keys; readers may briefly observe a partially
    /// invalidated group. Returns the number of keys the tag resolved to.
    pub async fn remove_by_tag(&self, tag: &str) -> usize {
        let keys: Vec<CacheKey> = self.tags.keys_for(tag).into_iter().collect();
        join_all(keys.iter().map(|key| self.remove(key))).await;
        self.tags.remove_tag(tag);

        debug!("Removed {} keys tagged {}", keys.len(), tag);
        keys.len()
    }

    pub async fn remove_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let mut total = 0;
        for tag in tags {
            total += self.remove_by_tag(tag.as_ref()).await;
        }
        total
    }

    /// Flush both layers, the tag index and every counter
    pub async fn clear_all(&self) {
        let cleared = self.fast.clear().await;
        if let Err(e) = self.shared.flush().await {
            warn!("Shared layer flush failed: {}", e);
        }
        self.tags.clear();
        self.key_stats.clear();
        self.counters.reset_traffic();
        if let Some(advisor) = &self.advisor {
            advisor.reset();
        }
        info!("Cleared all cache layers ({} fast entries)", cleared);
    }

    /// Existence probe, Fast then Shared; does not touch statistics
    pub async fn exists(&self, key: &str) -> bool {
        if self.fast.contains_key(key).await {
            return true;
        }
        match self.shared.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Shared layer exists failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Associate `key` with `tag`; idempotent
    pub fn set_tag(&self, key: &str, tag: &str) {
        if self.tags.add(key, tag) {
            debug!("Tagged {} with {}", key, tag);
        }
    }

    /// Populate `key` from `factory` into the Fast layer unless it already exists
    ///
    /// Returns whether a value was written.
    pub async fn warmup<T, F, Fut>(&self, key: &str, factory: F, ttl: Option<Duration>) -> bool
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if self.exists(key).await {
            debug!("Warmup skipped, already cached: {}", key);
            return false;
        }

        match factory().await {
            Ok(Some(value)) => self.set(key, &value, ttl, CacheLayer::Fast).await,
            Ok(None) => false,
            Err(e) => {
                warn!("Warmup factory for {} failed: {}", key, e);
                false
            }
        }
    }

    /// Aggregate layer counters into a snapshot
    pub fn statistics(&self) -> CacheStatistics {
        let c = &self.counters;
        CacheStatistics {
            fast: LayerStats {
                hits: load(&c.fast_hits),
                misses: load(&c.fast_misses),
            },
            shared: LayerStats {
                hits: load(&c.shared_hits),
                misses: load(&c.shared_misses),
            },
            persistent: LayerStats {
                hits: 0,
                misses: load(&c.persistent_misses),
            },
            total_hits: load(&c.hits),
            total_misses: load(&c.misses),
            hit_ratio: 0.0,
            promotions: load(&c.promotions),
            fast_entries: c.resident_entries.load(Ordering::Relaxed).max(0) as u64,
            fast_size_bytes: c.resident_bytes.load(Ordering::Relaxed).max(0) as u64,
            evictions: load(&c.evictions),
            tag_count: self.tags.tag_count(),
            tracked_keys: self.key_stats.len(),
        }
        .with_hit_ratio()
    }

    /// Per-key access statistics, if the key has been read
    pub fn key_statistics(&self, key: &str) -> Option<AccessStatistics> {
        self.key_stats.get(key).map(|s| s.clone())
    }

    /// Zero hit/miss counters and per-key statistics; residency is untouched
    pub fn reset_statistics(&self) {
        self.counters.reset_traffic();
        self.key_stats.clear();
        info!("Cache statistics reset");
    }

    async fn promote(&self, key: &str, value: &str) {
        if self
            .write_fast(key, value.to_string(), self.config.promotion_ttl)
            .await
        {
            self.counters.promotions.fetch_add(1, Ordering::Relaxed);
            debug!("Promoted {} into fast layer", key);
        }
    }

    async fn write_fast(&self, key: &str, payload: CacheValue, ttl: Duration) -> bool {
        match self.fast.insert(key.to_string(), payload, ttl).await {
            Ok(size) => {
                self.counters.admit(size);
                true
            }
            Err(e) => {
                warn!("Fast layer write failed for {}: {}", key, e);
                false
            }
        }
    }

    fn placement<T>(&self, key: &str, ttl: Option<Duration>, size: usize) -> (CacheLayer, Option<Duration>) {
        let Some(advisor) = &self.advisor else {
            return (self.config.default_layer, ttl);
        };

        let type_name = std::any::type_name::<T>();
        let data_type = type_name.rsplit("::").next().unwrap_or(type_name);
        let access_count = self
            .key_stats
            .get(key)
            .map(|s| s.access_count())
            .unwrap_or(0);
        let context = CacheContext::new(data_type, "Read")
            .with_access_count(access_count)
            .with_data_size(size);

        let layer = advisor.select_cache_layer(key, &context);
        let ttl = ttl.or_else(|| Some(advisor.calculate_expiration(key, &context)));
        (layer, ttl)
    }

    fn note_access(&self, key: &str) {
        if let Some(advisor) = &self.advisor {
            advisor.record_access(key);
        }
    }

    fn record_key(&self, key: &str, hit: bool, started: Instant) {
        if !self.config.enable_metrics {
            return;
        }
        let elapsed = started.elapsed().as_micros() as u64;
        self.key_stats
            .entry(key.to_string())
            .or_default()
            .record(hit, elapsed);
    }
}

/// Deserialize a cached payload; one that no longer fits `T` is treated as absent
fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Cached value for {} failed to deserialize: {}", key, e);
            None
        }
    }
}
