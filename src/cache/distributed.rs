//! Shared layer (L2) contract and an in-process implementation
//!
//! The Shared layer is an external key/value service (Redis-like). The cache
//! core only depends on the narrow [`DistributedStore`] contract; any client
//! that implements it can be plugged in. Calls may fail independently of the
//! core, which treats failures as misses (reads) or no-ops (writes).

use crate::cache::entry::expires_after;
use crate::cache::types::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Client contract for the Shared (distributed) layer
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Fetch a serialized value
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Store a serialized value with an expiration
    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove every key matching a `*` glob pattern, returning the count
    async fn remove_by_pattern(&self, pattern: &str) -> Result<u64>;

    /// Existence probe
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Drop every key
    async fn flush(&self) -> Result<()>;
}

/// `DashMap`-backed Shared layer for tests and single-node deployments
///
/// `set_available(false)` simulates an unreachable service: every call fails
/// with [`CacheError::Distributed`] until it is switched back on.
#[derive(Default)]
pub struct InMemoryDistributedStore {
    entries: DashMap<CacheKey, (CacheValue, DateTime<Utc>)>,
    unavailable: AtomicBool,
}

impl InMemoryDistributedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Distributed("shared store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DistributedStore for InMemoryDistributedStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.check_available()?;

        let now = Utc::now();
        let live = self
            .entries
            .get(key)
            .and_then(|e| (e.value().1 > now).then(|| e.value().0.clone()));

        if live.is_none() {
            // Drop the expired copy, if any, so it cannot resurface
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
        self.check_available()?;

        let expires_at = expires_after(Utc::now(), ttl);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn remove_by_pattern(&self, pattern: &str) -> Result<u64> {
        self.check_available()?;

        let before = self.entries.len();
        self.entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        debug!("Shared layer removed {} keys matching {}", removed, pattern);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = Utc::now();
        Ok(self.entries.get(key).is_some_and(|e| e.value().1 > now))
    }

    async fn flush(&self) -> Result<()> {
        self.check_available()?;
        self.entries.clear();
        Ok(())
    }
}

/// Match `text` against a pattern where `*` stands for any run of characters
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() {
        return false;
    }

    let mut rest = &text[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
