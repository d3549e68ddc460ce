//! Invalidation engine
//!
//! Decides what becomes stale when application data changes and removes it
//! through the cache core. All operations are best-effort: nothing here
//! returns an error, missing targets simply count as zero.
//!
//! Delayed invalidations are owned by the engine. Each scheduled removal has a
//! [`Uuid`] handle that can be cancelled, and [`InvalidationEngine::shutdown`]
//! either drains (runs now) or cancels whatever is still pending.

use crate::cache::entry::expires_after;
use crate::cache::layered::MultiLayerCache;
use crate::cache::types::CacheKey;
use crate::schema::{ChangeOperation, InventoryEntity, TrackedEntity};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationKind {
    Entity,
    Tag,
    Pattern,
    Smart,
    Delayed,
    Conditional,
    Batch,
}

impl fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidationKind::Entity => "entity",
            InvalidationKind::Tag => "tag",
            InvalidationKind::Pattern => "pattern",
            InvalidationKind::Smart => "smart",
            InvalidationKind::Delayed => "delayed",
            InvalidationKind::Conditional => "conditional",
            InvalidationKind::Batch => "batch",
        };
        f.write_str(name)
    }
}

/// Counters for one invalidation kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationRecord {
    pub kind: InvalidationKind,
    pub count: u64,
    pub last_timestamp: DateTime<Utc>,
    pub last_duration_ms: f64,
    pub average_duration_ms: f64,
    total_duration_ms: f64,
}

impl InvalidationRecord {
    fn new(kind: InvalidationKind) -> Self {
        Self {
            kind,
            count: 0,
            last_timestamp: Utc::now(),
            last_duration_ms: 0.0,
            average_duration_ms: 0.0,
            total_duration_ms: 0.0,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.count += 1;
        self.last_timestamp = Utc::now();
        self.last_duration_ms = ms;
        self.total_duration_ms += ms;
        self.average_duration_ms = self.total_duration_ms / self.count as f64;
    }
}

/// Aggregated view over every [`InvalidationRecord`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationStatistics {
    pub total_invalidations: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub last_invalidation: Option<DateTime<Utc>>,
    /// Mean over every recorded invalidation, not over per-kind averages
    pub average_duration_ms: f64,
    pub records: Vec<InvalidationRecord>,
    pub pending_delayed: usize,
}

/// What to do with delayed invalidations still pending at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Perform the removals immediately
    Drain,
    /// Drop them without removing anything
    Cancel,
}

/// Public view of a scheduled removal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedInvalidation {
    pub id: Uuid,
    pub key: CacheKey,
    pub due_at: DateTime<Utc>,
}

struct PendingInvalidation {
    key: CacheKey,
    due_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

pub struct InvalidationEngine {
    cache: Arc<MultiLayerCache>,
    records: DashMap<InvalidationKind, InvalidationRecord>,
    pending: DashMap<Uuid, PendingInvalidation>,
    closed: AtomicBool,
}

impl InvalidationEngine {
    pub fn new(cache: Arc<MultiLayerCache>) -> Self {
        Self {
            cache,
            records: DashMap::new(),
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<MultiLayerCache> {
        &self.cache
    }

    /// Remove the fixed key list and tags for the entity's kind
    ///
    /// Returns the number of keys removed directly plus keys resolved
    /// through tags.
    pub async fn invalidate_by_entity_type<T>(&self, entity: &T, operation: ChangeOperation) -> usize
    where
        T: TrackedEntity + ?Sized,
    {
        let started = Instant::now();
        let entity = entity.as_inventory_entity();
        let removed = self.purge_entity(&entity).await;

        self.record(InvalidationKind::Entity, started);
        debug!(
            "Invalidated {} on {} ({} keys)",
            entity.type_name(),
            operation,
            removed
        );
        removed
    }

    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let started = Instant::now();
        let removed = self.cache.remove_by_tag(tag).await;
        self.record(InvalidationKind::Tag, started);
        removed
    }

    /// Remove the key named by `pattern`
    ///
    /// The argument is treated as a literal key; no wildcard matching is
    /// performed. Use [`DistributedStore::remove_by_pattern`] for globbing on
    /// the Shared layer.
    ///
    /// [`DistributedStore::remove_by_pattern`]: crate::cache::distributed::DistributedStore::remove_by_pattern
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> bool {
        let started = Instant::now();
        let removed = self.cache.remove(pattern).await;
        self.record(InvalidationKind::Pattern, started);
        removed
    }

    /// Invalidate according to whether the change is significant
    ///
    /// A change is significant when there is no previous version or the
    /// previous version differs; it triggers a full entity-type invalidation.
    /// An unchanged entity only triggers it for create and delete.
    pub async fn smart_invalidate<T>(
        &self,
        old: Option<&T>,
        new: &T,
        operation: ChangeOperation,
    ) -> usize
    where
        T: TrackedEntity + PartialEq,
    {
        let started = Instant::now();
        let significant = old.map_or(true, |old| old != new);

        let removed = if significant {
            self.purge_entity(&new.as_inventory_entity()).await
        } else {
            match operation {
                ChangeOperation::Create | ChangeOperation::Delete => {
                    self.purge_entity(&new.as_inventory_entity()).await
                }
                ChangeOperation::Update => 0,
            }
        };

        self.record(InvalidationKind::Smart, started);
        debug!(
            "Smart invalidation on {} (significant: {}, {} keys)",
            operation, significant, removed
        );
        removed
    }

    /// Schedule removal of `key` after `delay` without blocking the caller
    ///
    /// Returns `None` once the engine has been shut down.
    pub fn delayed_invalidate(self: &Arc<Self>, key: &str, delay: Duration) -> Option<Uuid> {
        if self.closed.load(Ordering::SeqCst) {
            warn!("Delayed invalidation of {} rejected after shutdown", key);
            return None;
        }

        let id = Uuid::new_v4();
        let engine = Arc::clone(self);
        let task_key = key.to_string();
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            // Fire only after the handle is registered, so a short delay
            // cannot race the bookkeeping below
            let _ = registered_rx.await;
            tokio::time::sleep(delay).await;
            if engine.pending.remove(&id).is_some() {
                engine.remove_delayed(&task_key).await;
            }
        });

        let due_at = expires_after(Utc::now(), delay);
        self.pending.insert(
            id,
            PendingInvalidation {
                key: key.to_string(),
                due_at,
                handle,
            },
        );
        let _ = registered_tx.send(());

        debug!("Scheduled invalidation of {} in {:?} ({})", key, delay, id);
        Some(id)
    }

    /// Cancel a pending delayed invalidation; false if it already fired
    pub fn cancel_delayed(&self, id: Uuid) -> bool {
        match self.pending.remove(&id) {
            Some((_, pending)) => {
                pending.handle.abort();
                debug!("Cancelled delayed invalidation of {} ({})", pending.key, id);
                true
            }
            None => false,
        }
    }

    pub fn pending_delayed(&self) -> Vec<DelayedInvalidation> {
        let mut pending: Vec<DelayedInvalidation> = self
            .pending
            .iter()
            .map(|entry| DelayedInvalidation {
                id: *entry.key(),
                key: entry.value().key.clone(),
                due_at: entry.value().due_at,
            })
            .collect();
        pending.sort_by_key(|p| p.due_at);
        pending
    }

    /// Stop accepting delayed invalidations and settle the pending ones
    ///
    /// Returns how many pending invalidations were drained or cancelled.
    pub async fn shutdown(&self, mode: ShutdownMode) -> usize {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut settled = 0;
        for id in ids {
            let Some((_, pending)) = self.pending.remove(&id) else {
                continue;
            };
            pending.handle.abort();
            if mode == ShutdownMode::Drain {
                self.remove_delayed(&pending.key).await;
            }
            settled += 1;
        }

        info!("Invalidation engine shut down ({:?}, {} pending settled)", mode, settled);
        settled
    }

    /// Invalidate only when `predicate(entity)` holds
    pub async fn conditional_invalidate<T, P>(
        &self,
        entity: &T,
        predicate: P,
        operation: ChangeOperation,
    ) -> bool
    where
        T: TrackedEntity,
        P: FnOnce(&T) -> bool,
    {
        let started = Instant::now();
        let matched = predicate(entity);
        if matched {
            self.purge_entity(&entity.as_inventory_entity()).await;
        } else {
            debug!("Conditional invalidation skipped on {}", operation);
        }

        self.record(InvalidationKind::Conditional, started);
        matched
    }

    /// Remove the given keys concurrently, returning how many were present
    pub async fn batch_invalidate<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        let started = Instant::now();
        let removed = self.cache.remove_batch(keys).await;
        self.record(InvalidationKind::Batch, started);
        debug!("Batch invalidation removed {}/{} keys", removed, keys.len());
        removed
    }

    pub fn get_invalidation_statistics(&self) -> InvalidationStatistics {
        let mut records: Vec<InvalidationRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|r| r.kind);

        let total: u64 = records.iter().map(|r| r.count).sum();
        let total_ms: f64 = records.iter().map(|r| r.total_duration_ms).sum();

        InvalidationStatistics {
            total_invalidations: total,
            by_kind: records.iter().map(|r| (r.kind.to_string(), r.count)).collect(),
            last_invalidation: records.iter().map(|r| r.last_timestamp).max(),
            average_duration_ms: if total == 0 { 0.0 } else { total_ms / total as f64 },
            records,
            pending_delayed: self.pending.len(),
        }
    }

    async fn remove_delayed(&self, key: &str) {
        let started = Instant::now();
        self.cache.remove(key).await;
        self.record(InvalidationKind::Delayed, started);
        debug!("Delayed invalidation of {} fired", key);
    }

    async fn purge_entity(&self, entity: &InventoryEntity) -> usize {
        let keys = entity.cache_keys();
        let direct = self.cache.remove_batch(&keys).await;
        let tagged = self.cache.remove_by_tags(&entity.tags()).await;
        direct + tagged
    }

    fn record(&self, kind: InvalidationKind, started: Instant) {
        self.records
            .entry(kind)
            .or_insert_with(|| InvalidationRecord::new(kind))
            .record(started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::distributed::InMemoryDistributedStore;
    use crate::cache::types::CacheLayer;

    fn engine() -> Arc<InvalidationEngine> {
        let cache = MultiLayerCache::new(
            CacheConfig::default(),
            Arc::new(InMemoryDistributedStore::new()),
        );
        Arc::new(InvalidationEngine::new(Arc::new(cache)))
    }

    #[tokio::test]
    async fn test_pattern_is_literal_key() {
        let engine = engine();
        let cache = engine.cache();
        cache.set("product_1", &1, None, CacheLayer::Shared).await;
        cache.set("product_2", &2, None, CacheLayer::Shared).await;

        assert!(!engine.invalidate_by_pattern("product_*").await);
        assert!(cache.exists("product_1").await);
        assert!(engine.invalidate_by_pattern("product_1").await);
        assert!(!cache.exists("product_1").await);
        assert!(cache.exists("product_2").await);
    }

    #[tokio::test]
    async fn test_missing_target_is_zero_effect() {
        let engine = engine();
        assert_eq!(engine.invalidate_by_tag("nothing").await, 0);
        assert_eq!(engine.batch_invalidate(&["a", "b"]).await, 0);

        let stats = engine.get_invalidation_statistics();
        assert_eq!(stats.total_invalidations, 2);
        assert_eq!(stats.by_kind.get("tag"), Some(&1));
        assert_eq!(stats.by_kind.get("batch"), Some(&1));
    }

    #[tokio::test]
    async fn test_running_mean() {
        let mut record = InvalidationRecord::new(InvalidationKind::Tag);
        record.record(Duration::from_millis(10));
        record.record(Duration::from_millis(30));

        assert_eq!(record.count, 2);
        assert!((record.last_duration_ms - 30.0).abs() < 1e-9);
        assert!((record.average_duration_ms - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_delayed_cancel() {
        let engine = engine();
        engine.cache().set("k", &1, None, CacheLayer::Fast).await;

        let id = engine.delayed_invalidate("k", Duration::from_millis(50)).unwrap();
        assert_eq!(engine.pending_delayed().len(), 1);
        assert!(engine.cancel_delayed(id));
        assert!(!engine.cancel_delayed(id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.cache().exists("k").await);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let engine = engine();
        assert_eq!(engine.shutdown(ShutdownMode::Cancel).await, 0);
        assert!(engine.delayed_invalidate("k", Duration::from_secs(1)).is_none());
    }
}
