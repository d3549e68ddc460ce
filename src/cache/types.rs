//! Core type definitions for the cache system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type
pub type CacheKey = String;

/// Cache value type - stores serialized JSON payloads
pub type CacheValue = String;

/// Cache layer in the lookup cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayer {
    /// L1: in-process, lowest latency
    Fast,

    /// L2: out-of-process shared store
    Shared,

    /// L3: query-result tier, counted but not backed by storage yet
    Persistent,
}

impl CacheLayer {
    /// All layers in lookup order
    pub const ALL: [CacheLayer; 3] = [CacheLayer::Fast, CacheLayer::Shared, CacheLayer::Persistent];
}

impl fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLayer::Fast => write!(f, "fast"),
            CacheLayer::Shared => write!(f, "shared"),
            CacheLayer::Persistent => write!(f, "persistent"),
        }
    }
}

/// Hit/miss counters for a single layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub hits: u64,
    pub misses: u64,
}

impl LayerStats {
    /// Hit ratio for this layer (0.0 - 1.0)
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits, self.misses)
    }
}

/// Aggregated statistics for the multi-layer cache
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStatistics {
    /// Fast layer counters
    pub fast: LayerStats,

    /// Shared layer counters
    pub shared: LayerStats,

    /// Persistent layer counters (placeholder tier, only misses accrue)
    pub persistent: LayerStats,

    /// Reads answered by any layer
    pub total_hits: u64,

    /// Reads answered by no layer
    pub total_misses: u64,

    /// total_hits / (total_hits + total_misses), 0.0 with no traffic
    pub hit_ratio: f64,

    /// Values copied from the Shared layer into the Fast layer
    pub promotions: u64,

    /// Entries currently resident in the Fast layer
    pub fast_entries: u64,

    /// Bytes currently resident in the Fast layer
    pub fast_size_bytes: u64,

    /// Fast layer removals caused by capacity limits or expiry
    pub evictions: u64,

    /// Number of tags in the tag index
    pub tag_count: usize,

    /// Number of keys with per-key access statistics
    pub tracked_keys: usize,
}

impl CacheStatistics {
    /// Recompute the combined hit ratio from the totals
    pub fn with_hit_ratio(mut self) -> Self {
        self.hit_ratio = ratio(self.total_hits, self.total_misses);
        self
    }

    /// Total number of read requests observed
    pub fn total_requests(&self) -> u64 {
        self.total_hits + self.total_misses
    }
}

impl fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStatistics {{ hits: {}, misses: {}, hit_ratio: {:.2}, fast: {}/{}, shared: {}/{}, entries: {}, size: {} bytes }}",
            self.total_hits,
            self.total_misses,
            self.hit_ratio,
            self.fast.hits,
            self.fast.misses,
            self.shared.hits,
            self.shared.misses,
            self.fast_entries,
            self.fast_size_bytes
        )
    }
}

/// Per-key access statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessStatistics {
    pub hit_count: u64,
    pub miss_count: u64,
    pub last_access_time: DateTime<Utc>,

    /// Running average of lookup time in microseconds
    pub average_elapsed_micros: f64,
}

impl AccessStatistics {
    pub fn new() -> Self {
        Self {
            hit_count: 0,
            miss_count: 0,
            last_access_time: Utc::now(),
            average_elapsed_micros: 0.0,
        }
    }

    /// Fold one lookup into the counters
    pub fn record(&mut self, hit: bool, elapsed_micros: u64) {
        if hit {
            self.hit_count += 1;
        } else {
            self.miss_count += 1;
        }
        let n = self.access_count() as f64;
        self.average_elapsed_micros += (elapsed_micros as f64 - self.average_elapsed_micros) / n;
        self.last_access_time = Utc::now();
    }

    pub fn access_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hit_count, self.miss_count)
    }
}

impl Default for AccessStatistics {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
