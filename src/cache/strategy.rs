//! Adaptive cache strategy advisor
//!
//! Recommends placement layer, expiration and priority per key from the
//! observed access pattern. Decisions are pure apart from two small per-key
//! tracking maps (access counts and last access time) and a per-key pattern
//! memo. The maps hold at most [`DEFAULT_MAX_TRACKED_KEYS`] keys (see
//! [`StrategyAdvisor::with_capacity`]); past that, idle keys are dropped
//! first, then the least recently accessed. Every public method falls back to [`StrategyAdvisor::SAFE_DEFAULT`]
//! values when a decision cannot be computed.

use crate::cache::types::CacheLayer;
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Accesses above this count make a key hot
pub const HOT_ACCESS_THRESHOLD: u64 = 10;

/// A key accessed within this window is hot
pub const HOT_RECENCY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Single-access keys idle longer than this are treated as one-off reads
pub const ONE_TIME_IDLE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default bound on keys tracked by one advisor
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

const SHARED_DATA_TYPES: [&str; 3] = ["product", "category", "configuration"];
const PERSISTENT_DATA_TYPES: [&str; 3] = ["statistics", "report", "analytics"];

/// Classified access pattern of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessPattern {
    ReadHeavy,
    WriteHeavy,
    Mixed,
    OneTime,
    Periodic,
}

impl AccessPattern {
    /// Fixed expiration for the pattern
    pub fn expiration(&self) -> Duration {
        match self {
            AccessPattern::ReadHeavy => Duration::from_secs(24 * 3600),
            AccessPattern::WriteHeavy => Duration::from_secs(5 * 60),
            AccessPattern::Mixed => Duration::from_secs(3600),
            AccessPattern::OneTime => Duration::from_secs(60),
            AccessPattern::Periodic => Duration::from_secs(30 * 60),
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPattern::ReadHeavy => write!(f, "read_heavy"),
            AccessPattern::WriteHeavy => write!(f, "write_heavy"),
            AccessPattern::Mixed => write!(f, "mixed"),
            AccessPattern::OneTime => write!(f, "one_time"),
            AccessPattern::Periodic => write!(f, "periodic"),
        }
    }
}

/// Retention priority, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CachePriority {
    Low,
    Normal,
    High,
    Critical,
}

/// Advisory input describing one access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheContext {
    /// Declared data type, e.g. "Product" or "SalesStatistics"
    pub data_type: String,
    /// Operation name, e.g. "Read" or "UpdateStock"
    pub operation: String,
    pub access_time: DateTime<Utc>,
    /// Caller-observed access count
    pub access_count: u64,
    /// Time since the previous access, if known
    pub last_access_interval: Option<Duration>,
    pub is_hot_data: bool,
    pub is_critical_data: bool,
    /// Payload size in bytes
    pub data_size: usize,
}

impl CacheContext {
    pub fn new(data_type: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            operation: operation.into(),
            access_time: Utc::now(),
            access_count: 0,
            last_access_interval: None,
            is_hot_data: false,
            is_critical_data: false,
            data_size: 0,
        }
    }

    pub fn with_access_count(mut self, count: u64) -> Self {
        self.access_count = count;
        self
    }

    pub fn with_last_access_interval(mut self, interval: Duration) -> Self {
        self.last_access_interval = Some(interval);
        self
    }

    pub fn hot(mut self) -> Self {
        self.is_hot_data = true;
        self
    }

    pub fn critical(mut self) -> Self {
        self.is_critical_data = true;
        self
    }

    pub fn with_data_size(mut self, size: usize) -> Self {
        self.data_size = size;
        self
    }

    fn data_type_matches(&self, candidates: &[&str]) -> bool {
        let data_type = self.data_type.to_lowercase();
        candidates.iter().any(|c| data_type.contains(c))
    }

    fn is_write_operation(&self) -> bool {
        let operation = self.operation.to_lowercase();
        operation.contains("write") || operation.contains("update")
    }
}

/// Combined advice for one key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecommendation {
    pub layer: CacheLayer,
    pub expiration: Duration,
    pub priority: CachePriority,
    pub pattern: AccessPattern,
    pub should_warmup: bool,
    pub should_auto_invalidate: bool,
}

#[derive(Debug)]
pub struct StrategyAdvisor {
    access_counts: DashMap<String, u64>,
    last_access: DashMap<String, DateTime<Utc>>,
    patterns: DashMap<String, AccessPattern>,
    max_tracked_keys: usize,
}

impl Default for StrategyAdvisor {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACKED_KEYS)
    }
}

impl StrategyAdvisor {
    /// Fallback values used when a decision fails
    pub const SAFE_DEFAULT: CacheRecommendation = CacheRecommendation {
        layer: CacheLayer::Fast,
        expiration: Duration::from_secs(30 * 60),
        priority: CachePriority::Normal,
        pattern: AccessPattern::Mixed,
        should_warmup: false,
        should_auto_invalidate: false,
    };

    pub fn new() -> Self {
        Self::default()
    }

    /// Advisor tracking at most `max_tracked_keys` keys (minimum 1)
    pub fn with_capacity(max_tracked_keys: usize) -> Self {
        Self {
            access_counts: DashMap::new(),
            last_access: DashMap::new(),
            patterns: DashMap::new(),
            max_tracked_keys: max_tracked_keys.max(1),
        }
    }

    /// Record one access to `key`
    pub fn record_access(&self, key: &str) {
        *self.access_counts.entry(key.to_string()).or_insert(0) += 1;
        self.last_access.insert(key.to_string(), Utc::now());
        self.enforce_capacity();
    }

    /// Tracked access count for `key`
    pub fn access_count(&self, key: &str) -> u64 {
        self.access_counts.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Forget everything tracked for `key`
    pub fn forget(&self, key: &str) {
        self.forget_access(key);
        self.patterns.remove(key);
    }

    /// Drop the access count and recency of `key`, keeping its pattern memo
    pub fn forget_access(&self, key: &str) {
        self.access_counts.remove(key);
        self.last_access.remove(key);
    }

    /// Forget keys not accessed within `idle`; returns how many were dropped
    pub fn prune_idle(&self, idle: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };

        let stale: Vec<String> = self
            .last_access
            .iter()
            .filter(|entry| *entry.value() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &stale {
            self.forget(key);
        }
        stale.len()
    }

    /// Forget everything tracked for all keys
    pub fn reset(&self) {
        self.access_counts.clear();
        self.last_access.clear();
        self.patterns.clear();
    }

    pub fn tracked_keys(&self) -> usize {
        self.access_counts.len()
    }

    pub fn max_tracked_keys(&self) -> usize {
        self.max_tracked_keys
    }

    /// Fast for hot keys, Shared for catalog-like data, Persistent for
    /// reporting data, Fast otherwise
    pub fn select_cache_layer(&self, key: &str, context: &CacheContext) -> CacheLayer {
        self.try_select_layer(key, context)
            .unwrap_or_else(|e| fallback(key, "select_cache_layer", e, Self::SAFE_DEFAULT.layer))
    }

    /// Expiration derived from the key's access pattern
    pub fn calculate_expiration(&self, key: &str, context: &CacheContext) -> Duration {
        self.try_analyze(key, context)
            .map(|pattern| pattern.expiration())
            .unwrap_or_else(|e| {
                fallback(key, "calculate_expiration", e, Self::SAFE_DEFAULT.expiration)
            })
    }

    /// Whether the key deserves proactive warmup
    pub fn should_warmup(&self, key: &str, context: &CacheContext) -> bool {
        self.try_should_warmup(key, context)
            .unwrap_or_else(|e| fallback(key, "should_warmup", e, false))
    }

    /// Whether entries for the key should be invalidated automatically on writes
    pub fn should_auto_invalidate(&self, key: &str, context: &CacheContext) -> bool {
        self.try_analyze(key, context)
            .map(|pattern| pattern == AccessPattern::WriteHeavy)
            .unwrap_or_else(|e| fallback(key, "should_auto_invalidate", e, false))
    }

    /// Critical > High (hot) > Normal (shared data) > Low, first match wins
    pub fn get_cache_priority(&self, key: &str, context: &CacheContext) -> CachePriority {
        self.try_priority(key, context)
            .unwrap_or_else(|e| fallback(key, "get_cache_priority", e, Self::SAFE_DEFAULT.priority))
    }

    /// Classify the key's access pattern; the first result sticks per key
    pub fn analyze_cache_pattern(&self, key: &str, context: &CacheContext) -> AccessPattern {
        self.try_analyze(key, context)
            .unwrap_or_else(|e| fallback(key, "analyze_cache_pattern", e, Self::SAFE_DEFAULT.pattern))
    }

    /// All decisions for `key` at once
    pub fn recommend(&self, key: &str, context: &CacheContext) -> CacheRecommendation {
        let recommendation = CacheRecommendation {
            layer: self.select_cache_layer(key, context),
            expiration: self.calculate_expiration(key, context),
            priority: self.get_cache_priority(key, context),
            pattern: self.analyze_cache_pattern(key, context),
            should_warmup: self.should_warmup(key, context),
            should_auto_invalidate: self.should_auto_invalidate(key, context),
        };
        debug!(
            "Strategy for {}: layer={}, pattern={}, ttl={:?}, priority={:?}",
            key,
            recommendation.layer,
            recommendation.pattern,
            recommendation.expiration,
            recommendation.priority
        );
        recommendation
    }

    fn try_select_layer(&self, key: &str, context: &CacheContext) -> Result<CacheLayer> {
        if self.is_hot(key, context)? {
            return Ok(CacheLayer::Fast);
        }
        if context.data_type_matches(&SHARED_DATA_TYPES) {
            return Ok(CacheLayer::Shared);
        }
        if context.data_type_matches(&PERSISTENT_DATA_TYPES) {
            return Ok(CacheLayer::Persistent);
        }
        Ok(CacheLayer::Fast)
    }

    fn try_should_warmup(&self, key: &str, context: &CacheContext) -> Result<bool> {
        if context.is_critical_data || self.is_hot(key, context)? {
            return Ok(true);
        }
        let pattern = self.try_analyze(key, context)?;
        Ok(matches!(pattern, AccessPattern::ReadHeavy | AccessPattern::Periodic))
    }

    fn try_priority(&self, key: &str, context: &CacheContext) -> Result<CachePriority> {
        if context.is_critical_data {
            return Ok(CachePriority::Critical);
        }
        if self.is_hot(key, context)? {
            return Ok(CachePriority::High);
        }
        if context.data_type_matches(&SHARED_DATA_TYPES) {
            return Ok(CachePriority::Normal);
        }
        Ok(CachePriority::Low)
    }

    fn try_analyze(&self, key: &str, context: &CacheContext) -> Result<AccessPattern> {
        if let Some(pattern) = self.patterns.get(key) {
            return Ok(*pattern);
        }

        let pattern = self.classify(key, context)?;
        // A concurrent classification may have won; keep whichever landed first
        let pattern = *self.patterns.entry(key.to_string()).or_insert(pattern);
        self.enforce_capacity();
        Ok(pattern)
    }

    /// Shrink the tracking maps to 90% of capacity once either overflows
    fn enforce_capacity(&self) {
        let max = self.max_tracked_keys;
        if self.last_access.len() <= max && self.patterns.len() <= max {
            return;
        }

        let pruned = self.prune_idle(ONE_TIME_IDLE_WINDOW);
        let target = max - max / 10;

        if self.last_access.len() > target {
            let mut by_recency: Vec<(String, DateTime<Utc>)> = self
                .last_access
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect();
            by_recency.sort_by_key(|(_, at)| *at);
            let excess = by_recency.len().saturating_sub(target);
            for (key, _) in by_recency.into_iter().take(excess) {
                self.forget(&key);
            }
        }

        if self.patterns.len() > target {
            // Memos of keys no longer tracked go first, then arbitrary ones
            self.patterns.retain(|key, _| self.last_access.contains_key(key));
            let excess = self.patterns.len().saturating_sub(target);
            let extra: Vec<String> = self
                .patterns
                .iter()
                .take(excess)
                .map(|entry| entry.key().clone())
                .collect();
            for key in extra {
                self.patterns.remove(&key);
            }
        }

        debug!(
            "Advisor tracking trimmed to {} keys ({} idle dropped)",
            self.last_access.len(),
            pruned
        );
    }

    fn classify(&self, key: &str, context: &CacheContext) -> Result<AccessPattern> {
        if context.is_write_operation() {
            return Ok(AccessPattern::WriteHeavy);
        }
        if context.data_type_matches(&PERSISTENT_DATA_TYPES) {
            return Ok(AccessPattern::Periodic);
        }

        let count = self.effective_count(key, context);
        if count > HOT_ACCESS_THRESHOLD {
            return Ok(AccessPattern::ReadHeavy);
        }

        let idle = match context.last_access_interval {
            Some(interval) => Some(interval),
            None => self.since_last_access(key, context)?,
        };
        if count <= 1 && idle.map_or(true, |idle| idle > ONE_TIME_IDLE_WINDOW) {
            return Ok(AccessPattern::OneTime);
        }
        Ok(AccessPattern::Mixed)
    }

    fn is_hot(&self, key: &str, context: &CacheContext) -> Result<bool> {
        if context.is_hot_data || self.effective_count(key, context) > HOT_ACCESS_THRESHOLD {
            return Ok(true);
        }
        Ok(self
            .since_last_access(key, context)?
            .is_some_and(|elapsed| elapsed <= HOT_RECENCY_WINDOW))
    }

    fn effective_count(&self, key: &str, context: &CacheContext) -> u64 {
        self.access_count(key).max(context.access_count)
    }

    /// Time between the tracked last access and the context's access time
    fn since_last_access(&self, key: &str, context: &CacheContext) -> Result<Option<Duration>> {
        let Some(last) = self.last_access.get(key).map(|t| *t) else {
            return Ok(None);
        };

        let elapsed = context.access_time.signed_duration_since(last);
        let tolerance = chrono::Duration::from_std(HOT_RECENCY_WINDOW)
            .map_err(|e| CacheError::Other(e.to_string()))?;
        // Clock moved backwards by more than the recency window
        if elapsed < -tolerance {
            return Err(CacheError::Other(format!(
                "access time precedes last recorded access by {}s",
                -elapsed.num_seconds()
            )));
        }
        Ok(Some(elapsed.to_std().unwrap_or(Duration::ZERO)))
    }
}

fn fallback<T: fmt::Debug>(key: &str, decision: &str, error: CacheError, default: T) -> T {
    warn!("Strategy {} failed for {}: {}; using {:?}", decision, key, error, default);
    default
}
