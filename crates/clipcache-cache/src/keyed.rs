//! Generic keyed cache with limit-triggered, priority-ranked eviction.
//!
//! Keys supply their own hashing and equality through `Hash` and `Eq`, so a
//! key type may hash only part of itself (a frame number, say) and still be
//! compared structurally. Values are cheap handles; the cache keeps one clone
//! and hands out further clones.

use crate::config::CacheLimit;
use crate::priority::{NoPriority, PriorityPolicy};
use clipcache_core::Buffer;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

/// Values that can be stored in a [`KeyedCache`].
pub trait CacheValue {
    /// Bytes this value accounts for against the memory limit.
    fn memory_size(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

impl CacheValue for Buffer {
    fn memory_size(&self) -> usize {
        Buffer::memory_size(self)
    }
}

impl<T: CacheValue + ?Sized> CacheValue for Arc<T> {
    fn memory_size(&self) -> usize {
        self.as_ref().memory_size()
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct Entry<V> {
    value: V,
    size: usize,
    last_access: u64,
}

/// Key to value cache.
pub struct KeyedCache<K, V, P = NoPriority> {
    name: String,
    entries: HashMap<K, Entry<V>>,
    policy: P,
    limit: CacheLimit,
    last_key: Option<K>,
    memory_used: usize,
    tick: u64,
    stats: CacheStats,
}

impl<K, V> KeyedCache<K, V, NoPriority>
where
    K: Hash + Eq + Clone,
    V: CacheValue + Clone,
{
    /// Create an empty cache evicting least recently used entries first.
    pub fn new(name: impl Into<String>, limit: CacheLimit) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
            policy: NoPriority,
            limit,
            last_key: None,
            memory_used: 0,
            tick: 0,
            stats: CacheStats::default(),
        }
    }
}

impl<K, V, P> KeyedCache<K, V, P>
where
    K: Hash + Eq + Clone,
    V: CacheValue + Clone,
    P: PriorityPolicy<K>,
{
    /// Replace the eviction ranking, keeping all entries.
    pub fn with_priority<Q: PriorityPolicy<K>>(self, policy: Q) -> KeyedCache<K, V, Q> {
        KeyedCache {
            name: self.name,
            entries: self.entries,
            policy,
            limit: self.limit,
            last_key: self.last_key,
            memory_used: self.memory_used,
            tick: self.tick,
            stats: self.stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> CacheLimit {
        self.limit
    }

    /// Change the limit, evicting immediately if the cache is now over it.
    pub fn set_limit(&mut self, limit: CacheLimit) {
        self.limit = limit;
        self.enforce_limit(None);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Memory accounted to stored values, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.memory_used
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Key of the most recent hit or insertion.
    pub fn last_key(&self) -> Option<&K> {
        self.last_key.as_ref()
    }

    /// Look up a value, refreshing its recency on a hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.tick;
                self.stats.hits += 1;
                let value = entry.value.clone();
                self.last_key = Some(key.clone());
                Some(value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up a value without touching recency or statistics.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn has(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Edit a stored value in place without touching recency.
    ///
    /// The entry's accounted size is refreshed afterwards; no eviction runs.
    pub fn modify<F, R>(&mut self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let entry = self.entries.get_mut(key)?;
        let result = f(&mut entry.value);
        let size = entry.value.memory_size();
        self.memory_used = self.memory_used - entry.size + size;
        entry.size = size;
        Some(result)
    }

    /// Store a value, replacing any entry with the same key.
    ///
    /// Evicts other entries if the cache goes over its limit. The entry just
    /// stored is never evicted by its own insertion. Returns the replaced
    /// value.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let replaced = self.insert_entry(key.clone(), value);
        self.enforce_limit(Some(&key));
        replaced
    }

    /// Store a value only if the key is absent and it fits without evicting.
    pub fn put_if_possible(&mut self, key: K, value: V) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        let size = value.memory_size();
        if self
            .limit
            .is_exceeded(self.memory_used + size, self.entries.len() + 1)
        {
            trace!(cache = %self.name, size, "put rejected, no room without eviction");
            return false;
        }
        self.insert_entry(key, value);
        true
    }

    /// Remove one entry.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| {
            self.memory_used -= entry.size;
            entry.value
        })
    }

    /// Remove every entry for which `predicate` returns true.
    pub fn cleanup<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let before = self.entries.len();
        let mut freed = 0;
        self.entries.retain(|key, entry| {
            let remove = predicate(key, &entry.value);
            if remove {
                freed += entry.size;
            }
            !remove
        });
        self.memory_used -= freed;
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(cache = %self.name, removed, freed, "cleanup removed entries");
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.memory_used = 0;
        self.last_key = None;
        debug!(cache = %self.name, removed, "cache cleared");
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, entry)| (key, &entry.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    fn insert_entry(&mut self, key: K, value: V) -> Option<V> {
        self.tick += 1;
        let size = value.memory_size();
        let entry = Entry {
            value,
            size,
            last_access: self.tick,
        };
        self.memory_used += size;
        self.stats.insertions += 1;
        self.last_key = Some(key.clone());
        let replaced = self.entries.insert(key, entry).map(|old| {
            self.memory_used -= old.size;
            old.value
        });
        trace!(cache = %self.name, size, replaced = replaced.is_some(), "stored entry");
        replaced
    }

    fn enforce_limit(&mut self, keep: Option<&K>) {
        if !self.limit.is_exceeded(self.memory_used, self.entries.len()) {
            return;
        }

        // Lowest rank first, older access first on equal rank.
        let mut ranked: Vec<(i64, u64, K)> = self
            .entries
            .iter()
            .filter(|(key, _)| Some(*key) != keep)
            .map(|(key, entry)| {
                let rank = match &self.last_key {
                    Some(last) => self.policy.compare(last, &self.policy.extract(key)),
                    None => 0,
                };
                (rank, entry.last_access, key.clone())
            })
            .collect();
        ranked.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut evicted = 0;
        for (_, _, key) in ranked {
            if !self.limit.is_exceeded(self.memory_used, self.entries.len()) {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.memory_used -= entry.size;
                evicted += 1;
            }
        }
        self.stats.evictions += evicted;
        if evicted > 0 {
            debug!(
                cache = %self.name,
                evicted,
                memory = self.memory_used,
                entries = self.entries.len(),
                "evicted entries over limit"
            );
        }
    }
}
