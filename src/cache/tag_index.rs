//! Bidirectional tag index for group invalidation
//!
//! `key_to_tags` is always updated before `tag_to_keys`, so an interrupted
//! mutation leaves at most an unreachable tag reference behind, never a tag
//! pointing at a key that does not know about it.
//!
//! Every two-sided update runs while holding the key's `key_to_tags` shard
//! entry, so updates for one key are serialized while unrelated keys proceed.
//! Locks are always taken key-map first, tag-map second.

use crate::cache::types::CacheKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: DashMap<String, HashSet<CacheKey>>,
    key_to_tags: DashMap<CacheKey, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with `tag`; returns false if already associated
    pub fn add(&self, key: &str, tag: &str) -> bool {
        let mut tags = self.key_to_tags.entry(key.to_string()).or_default();
        let inserted = tags.insert(tag.to_string());

        self.tag_to_keys
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());

        drop(tags);
        inserted
    }

    /// Tags attached to a key
    pub fn tags_for(&self, key: &str) -> HashSet<String> {
        self.key_to_tags
            .get(key)
            .map(|tags| tags.clone())
            .unwrap_or_default()
    }

    /// Keys carrying a tag
    pub fn keys_for(&self, tag: &str) -> HashSet<CacheKey> {
        self.tag_to_keys
            .get(tag)
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    /// Drop a key from every tag it carries, pruning tags left empty
    pub fn remove_key(&self, key: &str) -> HashSet<String> {
        let Entry::Occupied(occupied) = self.key_to_tags.entry(key.to_string()) else {
            return HashSet::new();
        };

        for tag in occupied.get() {
            self.detach(key, tag);
        }
        occupied.remove()
    }

    /// Drop a tag entry and detach it from its keys
    pub fn remove_tag(&self, tag: &str) -> HashSet<CacheKey> {
        let keys = self.keys_for(tag);

        for key in &keys {
            if let Entry::Occupied(mut occupied) = self.key_to_tags.entry(key.clone()) {
                occupied.get_mut().remove(tag);
                self.detach(key, tag);
                if occupied.get().is_empty() {
                    occupied.remove();
                }
            }
        }

        // A concurrent add may have re-tagged a key meanwhile; keep it then
        self.tag_to_keys.remove_if(tag, |_, keys| keys.is_empty());
        keys
    }

    /// Remove `key` from the tag's key set, pruning the tag when it empties
    fn detach(&self, key: &str, tag: &str) {
        if let Some(mut keys) = self.tag_to_keys.get_mut(tag) {
            keys.remove(key);
        }
        self.tag_to_keys.remove_if(tag, |_, keys| keys.is_empty());
    }

    pub fn clear(&self) {
        self.key_to_tags.clear();
        self.tag_to_keys.clear();
    }

    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    pub fn key_count(&self) -> usize {
        self.key_to_tags.len()
    }

    /// Check both directions of the index agree
    ///
    /// Intended for quiescent checks; it reads both maps at once.
    pub fn is_consistent(&self) -> bool {
        let forward = self.tag_to_keys.iter().all(|entry| {
            !entry.value().is_empty()
                && entry.value().iter().all(|key| {
                    self.key_to_tags
                        .get(key)
                        .is_some_and(|tags| tags.contains(entry.key()))
                })
        });

        let backward = self.key_to_tags.iter().all(|entry| {
            !entry.value().is_empty()
                && entry.value().iter().all(|tag| {
                    self.tag_to_keys
                        .get(tag)
                        .is_some_and(|keys| keys.contains(entry.key()))
                })
        });

        forward && backward
    }
}
