//! Per-layer entry record: payload, expiry and access bookkeeping

use crate::cache::types::{CacheKey, CacheLayer, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size assumed for a value whose serialized length cannot be computed
pub const FALLBACK_SIZE_ESTIMATE: usize = 1024;

/// A cache entry owned by a single layer
///
/// Promotion between layers creates a new entry rather than moving this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached value (serialized payload)
    pub value: CacheValue,

    /// Approximate size of the entry in bytes
    pub size_estimate: usize,

    /// Absolute expiration time
    pub expires_at: DateTime<Utc>,

    /// Layer that owns this copy
    pub layer: CacheLayer,

    pub created_at: DateTime<Utc>,

    /// Drives LRU ordering in the Fast layer
    pub accessed_at: DateTime<Utc>,

    /// Number of reads served from this entry
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a new entry expiring `ttl` from now
    pub fn new(key: CacheKey, value: CacheValue, ttl: Duration, layer: CacheLayer) -> Self {
        Self::with_expiration(key, value, expires_after(Utc::now(), ttl), layer)
    }

    /// Create a new entry with an absolute expiration time
    pub fn with_expiration(
        key: CacheKey,
        value: CacheValue,
        expires_at: DateTime<Utc>,
        layer: CacheLayer,
    ) -> Self {
        let now = Utc::now();
        let size_estimate = estimate_size(&key, &value);

        Self {
            key,
            value,
            size_estimate,
            expires_at,
            layer,
            created_at: now,
            accessed_at: now,
            access_count: 0,
        }
    }

    /// Expiry is inclusive: an entry is gone at `expires_at`
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn time_until_expiration(&self) -> Option<Duration> {
        (self.expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|left| !left.is_zero())
    }

    /// Record a read served from this entry
    pub fn mark_accessed(&mut self) {
        self.accessed_at = Utc::now();
        self.access_count += 1;
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }
}

/// `start + ttl`, saturating at the latest representable instant
///
/// TTLs too large for chrono (up to `Duration::MAX`) mean "never expires in
/// practice" rather than an error.
pub fn expires_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|lifetime| start.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Approximate footprint: key + value + fixed overhead
fn estimate_size(key: &str, value: &str) -> usize {
    key.len() + value.len() + std::mem::size_of::<CacheEntry>()
}

/// Estimate the serialized size of an arbitrary value
///
/// Falls back to [`FALLBACK_SIZE_ESTIMATE`] when the value cannot be
/// serialized.
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or(FALLBACK_SIZE_ESTIMATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread::sleep;

    #[test]
    fn new_entry_is_live_and_sized() {
        let entry = CacheEntry::new(
            "product_42".to_string(),
            "{\"id\":42}".to_string(),
            Duration::from_secs(3600),
            CacheLayer::Fast,
        );

        assert_eq!(entry.key, "product_42");
        assert_eq!(entry.layer, CacheLayer::Fast);
        assert!(!entry.is_expired());
        assert!(entry.size_estimate >= "product_42".len() + "{\"id\":42}".len());
    }

    #[test]
    fn short_lived_entry_expires() {
        let entry = CacheEntry::new(
            "recent_sales".to_string(),
            "[]".to_string(),
            Duration::from_millis(50),
            CacheLayer::Fast,
        );
        assert!(entry.time_until_expiration().is_some());
        sleep(Duration::from_millis(80));
        assert!(entry.is_expired());
        assert!(entry.time_until_expiration().is_none());
    }

    #[test]
    fn reads_bump_access_metadata() {
        let mut entry = CacheEntry::new(
            "user_7".to_string(),
            "{}".to_string(),
            Duration::from_secs(60),
            CacheLayer::Shared,
        );
        let created = entry.accessed_at;

        sleep(Duration::from_millis(10));
        entry.mark_accessed();
        entry.mark_accessed();

        assert_eq!(entry.access_count, 2);
        assert!(entry.accessed_at > created);
        assert!(entry.age() >= Duration::from_millis(10));
    }

    #[test]
    fn huge_ttls_saturate_instead_of_overflowing() {
        let now = Utc::now();
        assert_eq!(expires_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            expires_after(now, Duration::from_secs(100_000_000_000_000)),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(
            expires_after(now, Duration::from_secs(60)),
            now + chrono::Duration::seconds(60)
        );

        let entry = CacheEntry::new(
            "app_settings".to_string(),
            "{}".to_string(),
            Duration::MAX,
            CacheLayer::Fast,
        );
        assert!(!entry.is_expired());
        assert!(entry.time_until_expiration().is_some());
    }

    #[test]
    fn serialized_size_falls_back_when_unserializable() {
        assert_eq!(serialized_size(&"abc"), 5);

        // Maps with non-string keys cannot be serialized to JSON
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        assert_eq!(serialized_size(&bad), FALLBACK_SIZE_ESTIMATE);
    }
}
