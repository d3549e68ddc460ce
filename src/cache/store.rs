//! Fast layer (L1): in-process store with TTL, LRU eviction and eviction callbacks

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    types::{CacheKey, CacheLayer, CacheValue},
};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why an entry left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionCause {
    /// Expiration time passed
    Expired,
    /// Entry-count or size limit reached
    Capacity,
    /// Explicit removal
    Removed,
    /// Overwritten by a newer value for the same key
    Replaced,
    /// Whole store flushed
    Cleared,
}

impl EvictionCause {
    /// Whether the removal was decided by the store rather than a caller
    pub fn is_eviction(&self) -> bool {
        matches!(self, EvictionCause::Expired | EvictionCause::Capacity)
    }
}

impl fmt::Display for EvictionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionCause::Expired => write!(f, "TTL expired"),
            EvictionCause::Capacity => write!(f, "capacity limit"),
            EvictionCause::Removed => write!(f, "explicit removal"),
            EvictionCause::Replaced => write!(f, "replaced"),
            EvictionCause::Cleared => write!(f, "cleared"),
        }
    }
}

/// Callback invoked once for every entry that physically leaves the store
pub type EvictionListener = Arc<dyn Fn(&CacheEntry, EvictionCause) + Send + Sync>;

/// Residency counters for the store
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub evictions_capacity: u64,
    pub evictions_ttl: u64,
}

/// In-process key/value store backing the Fast layer
///
/// - Thread-safe async access via RwLock
/// - Expired entries are never returned, even before the sweeper removes them
/// - LRU eviction when entry-count or size limits are reached
/// - Eviction listener fired after the lock is released
pub struct MemoryStore {
    config: CacheConfig,
    inner: RwLock<StoreInner>,
    listener: Option<EvictionListener>,
}

struct StoreInner {
    entries: HashMap<CacheKey, CacheEntry>,

    /// Access order, least recently used at the front
    lru_queue: VecDeque<CacheKey>,

    stats: StoreStats,
}

impl StoreInner {
    fn take(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.stats.size_bytes = self.stats.size_bytes.saturating_sub(entry.size_estimate);
        self.stats.entries = self.entries.len();
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

impl MemoryStore {
    pub fn new(config: CacheConfig) -> Self {
        debug!(
            "Initializing fast layer (max_entries: {}, max_size_bytes: {})",
            config.max_entries, config.max_size_bytes
        );

        Self {
            config,
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                stats: StoreStats::default(),
            }),
            listener: None,
        }
    }

    /// Create a store that reports removals to `listener`
    pub fn with_listener(config: CacheConfig, listener: EvictionListener) -> Self {
        let mut store = Self::new(config);
        store.listener = Some(listener);
        store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert or overwrite a value expiring `ttl` from now
    ///
    /// Returns the stored entry's size estimate.
    pub async fn insert(&self, key: CacheKey, value: CacheValue, ttl: Duration) -> Result<usize> {
        let entry = CacheEntry::new(key.clone(), value, ttl, CacheLayer::Fast);
        let size = entry.size_estimate;

        if size > self.config.max_size_bytes {
            warn!("Entry {} ({} bytes) exceeds fast layer capacity", key, size);
            return Err(CacheError::Other(format!(
                "entry of {} bytes exceeds fast layer capacity of {} bytes",
                size, self.config.max_size_bytes
            )));
        }

        let mut removed = Vec::new();
        {
            let mut inner = self.inner.write().await;

            if let Some(old) = inner.take(&key) {
                removed.push((old, EvictionCause::Replaced));
            }

            Self::evict_for(&self.config, &mut inner, size, &mut removed);

            inner.entries.insert(key.clone(), entry);
            inner.lru_queue.push_back(key.clone());
            inner.stats.size_bytes += size;
            inner.stats.entries = inner.entries.len();
        }

        debug!("Fast layer set: {} ({} bytes, ttl {:?})", key, size, ttl);
        self.notify(removed);
        Ok(size)
    }

    /// Get a live value, updating recency
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let expired = {
            let mut inner = self.inner.write().await;
            let is_expired = inner.entries.get(key)?.is_expired();

            if is_expired {
                inner.stats.evictions_ttl += 1;
                inner.take(key)
            } else {
                let entry = inner.entries.get_mut(key)?;
                entry.mark_accessed();
                let value = entry.value.clone();
                inner.touch(key);
                return Some(value);
            }
        };

        if let Some(entry) = expired {
            debug!("Fast layer entry expired on read: {}", key);
            self.notify(vec![(entry, EvictionCause::Expired)]);
        }
        None
    }

    /// Snapshot of a live entry without touching access metadata
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        let inner = self.inner.read().await;
        inner.entries.get(key).filter(|e| !e.is_expired()).cloned()
    }

    /// Check if a live entry exists (without updating access time)
    pub async fn contains_key(&self, key: &str) -> bool {
        let inner = self.inner.read().await;
        inner.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Remove a specific entry
    pub async fn remove(&self, key: &str) -> Option<CacheEntry> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner.take(key)
        };

        let entry = removed?;
        debug!("Fast layer remove: {}", key);
        self.notify(vec![(entry.clone(), EvictionCause::Removed)]);
        Some(entry)
    }

    /// Clear all entries, returning how many were dropped
    pub async fn clear(&self) -> usize {
        let drained: Vec<CacheEntry> = {
            let mut inner = self.inner.write().await;
            inner.lru_queue.clear();
            inner.stats.entries = 0;
            inner.stats.size_bytes = 0;
            inner.entries.drain().map(|(_, e)| e).collect()
        };

        let count = drained.len();
        info!("Cleared {} entries from fast layer", count);
        self.notify(drained.into_iter().map(|e| (e, EvictionCause::Cleared)).collect());
        count
    }

    /// Remove all expired entries, returning their keys
    pub async fn cleanup_expired(&self) -> Vec<CacheKey> {
        let expired: Vec<CacheEntry> = {
            let mut inner = self.inner.write().await;
            let keys: Vec<CacheKey> = inner
                .entries
                .iter()
                .filter(|(_, e)| e.is_expired())
                .map(|(k, _)| k.clone())
                .collect();

            let removed: Vec<CacheEntry> = keys.iter().filter_map(|k| inner.take(k)).collect();
            inner.stats.evictions_ttl += removed.len() as u64;
            removed
        };

        let keys: Vec<CacheKey> = expired.iter().map(|e| e.key.clone()).collect();
        if !keys.is_empty() {
            debug!("Cleaned up {} expired fast layer entries", keys.len());
        }
        self.notify(expired.into_iter().map(|e| (e, EvictionCause::Expired)).collect());
        keys
    }

    pub async fn stats(&self) -> StoreStats {
        self.inner.read().await.stats
    }

    pub async fn size_bytes(&self) -> usize {
        self.inner.read().await.stats.size_bytes
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Internal: make room for an entry of `needed_size` bytes
    fn evict_for(
        config: &CacheConfig,
        inner: &mut StoreInner,
        needed_size: usize,
        removed: &mut Vec<(CacheEntry, EvictionCause)>,
    ) {
        while inner.entries.len() >= config.max_entries
            || inner.stats.size_bytes + needed_size > config.max_size_bytes
        {
            let Some(key) = inner.lru_queue.pop_front() else {
                break;
            };
            if let Some(entry) = inner.take(&key) {
                debug!("Evicting fast layer entry (LRU): {}", key);
                inner.stats.evictions_capacity += 1;
                removed.push((entry, EvictionCause::Capacity));
            }
        }
    }

    fn notify(&self, removed: Vec<(CacheEntry, EvictionCause)>) {
        if let Some(listener) = &self.listener {
            for (entry, cause) in &removed {
                listener(entry, *cause);
            }
        }
    }
}

/// Lower bound on the expiry sweep period
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Background task that periodically removes expired entries
///
/// A zero `cleanup_interval` (possible when the configuration bypassed
/// [`CacheConfig::validate`]) is raised to [`MIN_SWEEP_INTERVAL`].
pub fn spawn_expiry_sweeper(store: Arc<MemoryStore>) -> JoinHandle<()> {
    let mut interval = store.config.cleanup_interval;
    if interval.is_zero() {
        warn!("Zero cleanup interval, sweeping every {:?} instead", MIN_SWEEP_INTERVAL);
        interval = MIN_SWEEP_INTERVAL;
    }
    info!("Starting fast layer expiry sweeper (interval: {:?})", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup_expired().await;
            if !removed.is_empty() {
                debug!("Expiry sweep removed {} entries", removed.len());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn store_with(max_entries: usize) -> MemoryStore {
        MemoryStore::new(CacheConfig::builder().max_entries(max_entries).build())
    }

    #[tokio::test]
    async fn test_basic_insert_and_get() {
        let store = store_with(100);
        store
            .insert("key1".to_string(), "value1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("key1").await, Some("value1".to_string()));
        assert_eq!(store.get("missing").await, None);
        assert_eq!(store.len().await, 1);
        assert!(store.size_bytes().await > 0);
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent() {
        let store = store_with(100);
        store
            .insert("key1".to_string(), "value1".to_string(), Duration::from_millis(50))
            .await
            .unwrap();

        assert!(store.contains_key("key1").await);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!store.contains_key("key1").await);
        assert!(store.entry("key1").await.is_none());
        assert_eq!(store.get("key1").await, None);
        assert_eq!(store.stats().await.evictions_ttl, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = store_with(3);
        for i in 1..=3 {
            store
                .insert(format!("key{}", i), format!("value{}", i), Duration::from_secs(60))
                .await
                .unwrap();
        }

        // key1 becomes most recently used, key2 is now the LRU entry
        store.get("key1").await;
        store
            .insert("key4".to_string(), "value4".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.contains_key("key1").await);
        assert!(!store.contains_key("key2").await);
        assert!(store.contains_key("key4").await);
        assert_eq!(store.stats().await.evictions_capacity, 1);
    }

    #[tokio::test]
    async fn test_oversized_entry_rejected() {
        let store = MemoryStore::new(CacheConfig::builder().max_size_bytes(64).build());
        let result = store
            .insert("big".to_string(), "v".repeat(1000), Duration::from_secs(60))
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_listener_sees_every_removal() {
        let seen: Arc<Mutex<Vec<(String, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: EvictionListener = Arc::new(move |entry: &CacheEntry, cause: EvictionCause| {
            sink.lock().unwrap().push((entry.key.clone(), cause));
        });

        let store = MemoryStore::with_listener(
            CacheConfig::builder().max_entries(1).build(),
            listener,
        );

        let ttl = Duration::from_secs(60);
        store.insert("a".to_string(), "1".to_string(), ttl).await.unwrap();
        store.insert("a".to_string(), "2".to_string(), ttl).await.unwrap();
        store.insert("b".to_string(), "3".to_string(), ttl).await.unwrap();
        store.remove("b").await;
        store.remove("b").await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), EvictionCause::Replaced),
                ("a".to_string(), EvictionCause::Capacity),
                ("b".to_string(), EvictionCause::Removed),
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_and_cleanup() {
        let store = store_with(100);
        store
            .insert("short".to_string(), "v".to_string(), Duration::from_millis(30))
            .await
            .unwrap();
        store
            .insert("long".to_string(), "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let removed = store.cleanup_expired().await;
        assert_eq!(removed, vec!["short".to_string()]);
        assert_eq!(store.len().await, 1);

        assert_eq!(store.clear().await, 1);
        assert_eq!(store.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_sweeper_survives_zero_interval() {
        let config = CacheConfig {
            cleanup_interval: Duration::ZERO,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new(config));
        store
            .insert("short".to_string(), "v".to_string(), Duration::from_millis(20))
            .await
            .unwrap();

        let sweeper = spawn_expiry_sweeper(store.clone());
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert!(!sweeper.is_finished());
        assert_eq!(store.len().await, 0);
        sweeper.abort();
    }

    #[test]
    fn test_eviction_cause() {
        assert!(EvictionCause::Expired.is_eviction());
        assert!(EvictionCause::Capacity.is_eviction());
        assert!(!EvictionCause::Removed.is_eviction());
        assert_eq!(EvictionCause::Capacity.to_string(), "capacity limit");
    }
}
