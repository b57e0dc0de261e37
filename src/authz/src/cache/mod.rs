//! Permission cache
//!
//! Memoizes effective bitmasks per entity and boolean results per
//! `(entity, action)`. Entries expire after a TTL and are dropped
//! synchronously whenever an assignment touching the entity changes.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::bitmask::Bitmask;
use crate::types::EntityRef;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the engine caches at all
    pub enabled: bool,

    /// Time-to-live for cached entries, in seconds
    pub ttl_secs: u64,

    /// Maximum number of entries per cache map
    pub capacity: usize,
}

impl CacheConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            capacity: 10_000,
        }
    }
}

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

type CheckKey = (EntityRef, String);

/// Statistics about cache performance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,
    /// Number of cache misses
    pub misses: usize,
    /// Number of expired entries encountered
    pub expirations: usize,
    /// Number of explicit invalidations
    pub invalidations: usize,
    /// Total number of entries in cache
    pub entries: usize,
}

impl CacheStats {
    /// Calculates the cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Aggregate and per-action result cache
pub struct PermissionCache {
    aggregates: Arc<DashMap<EntityRef, CacheEntry<Bitmask>>>,
    checks: Arc<DashMap<CheckKey, CacheEntry<bool>>>,
    config: CacheConfig,
    stats: Arc<DashMap<&'static str, usize>>,
}

impl PermissionCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            aggregates: Arc::new(DashMap::new()),
            checks: Arc::new(DashMap::new()),
            config,
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached effective bitmask of an entity
    pub fn get_aggregate(&self, entity: &EntityRef) -> Option<Bitmask> {
        let ttl = self.config.ttl();
        if let Some(entry) = self.aggregates.get(entity) {
            if entry.is_expired(ttl) {
                drop(entry);
                self.aggregates.remove(entity);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                return None;
            }
            self.increment_stat("hits");
            return Some(entry.value.clone());
        }

        self.increment_stat("misses");
        None
    }

    /// Stores the effective bitmask of an entity
    pub fn put_aggregate(&self, entity: &EntityRef, value: Bitmask) {
        if self.aggregates.len() >= self.config.capacity {
            Self::evict_oldest(&self.aggregates, self.config.capacity);
        }
        self.aggregates.insert(entity.clone(), CacheEntry::new(value));
    }

    /// Cached result of one action check
    pub fn get_check(&self, entity: &EntityRef, action: &str) -> Option<bool> {
        let key = (entity.clone(), action.to_string());
        let ttl = self.config.ttl();
        if let Some(entry) = self.checks.get(&key) {
            if entry.is_expired(ttl) {
                drop(entry);
                self.checks.remove(&key);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                return None;
            }
            self.increment_stat("hits");
            return Some(entry.value);
        }

        self.increment_stat("misses");
        None
    }

    /// Stores the result of one action check
    pub fn put_check(&self, entity: &EntityRef, action: &str, allowed: bool) {
        if self.checks.len() >= self.config.capacity {
            Self::evict_oldest(&self.checks, self.config.capacity);
        }
        self.checks
            .insert((entity.clone(), action.to_string()), CacheEntry::new(allowed));
    }

    /// Drops every entry of one entity
    pub fn invalidate(&self, entity: &EntityRef) {
        self.aggregates.remove(entity);
        self.checks.retain(|(owner, _), _| owner != entity);
        self.increment_stat("invalidations");
        debug!("Invalidated cache for {}", entity);
    }

    /// Drops every entry of each entity
    pub fn invalidate_all<'a, I>(&self, entities: I)
    where
        I: IntoIterator<Item = &'a EntityRef>,
    {
        for entity in entities {
            self.invalidate(entity);
        }
    }

    /// Clears the entire cache
    pub fn clear(&self) {
        self.aggregates.clear();
        self.checks.clear();
        self.stats.clear();
    }

    /// Removes expired entries
    pub fn cleanup_expired(&self) {
        let ttl = self.config.ttl();
        self.aggregates.retain(|_, entry| !entry.is_expired(ttl));
        self.checks.retain(|_, entry| !entry.is_expired(ttl));
    }

    /// Returns cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            invalidations: self.get_stat("invalidations"),
            entries: self.aggregates.len() + self.checks.len(),
        }
    }

    /// Evicts the oldest tenth of a full map
    fn evict_oldest<K, V>(map: &DashMap<K, CacheEntry<V>>, capacity: usize)
    where
        K: Eq + std::hash::Hash + Clone,
    {
        let to_remove = (capacity / 10).max(1);
        let mut by_age: Vec<(K, Instant)> = map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().created_at))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);

        for (key, _) in by_age.into_iter().take(to_remove) {
            map.remove(&key);
        }
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}
