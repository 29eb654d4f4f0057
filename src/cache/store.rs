//! In-memory result cache with TTL expiry and LRU eviction

use super::key::CacheKey;
use crate::config::CacheConfig;
use crate::event::{Event, Field, FieldMap, ParsingPath};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache failures. Always non-fatal: the pipeline bypasses the cache.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// What a hit gives back: everything needed to rebuild the response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedExtraction {
    pub event: Event,
    pub field_results: FieldMap,
    pub parsing_path: ParsingPath,
    pub unconfirmed_fields: Vec<Field>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed for capacity.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    pub entries: usize,
}

/// Storage behind the pipeline's read-through cache.
///
/// Implementations must be safe under concurrent callers. Errors are
/// reported, never panicked, so a broken backend only costs performance.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedExtraction>, CacheError>;

    fn put(&self, key: CacheKey, value: CachedExtraction) -> Result<(), CacheError>;

    fn stats(&self) -> CacheStats;
}

/// One stored extraction.
#[derive(Debug)]
pub struct CacheEntry {
    pub value: CachedExtraction,
    pub created_at: Instant,
    pub ttl: Duration,
    /// Tick of the most recent read or write.
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }
}

/// Bounded in-memory cache.
///
/// Eviction policy is least-recently-used: every hit and every write stamps
/// the entry with a monotonic tick, and the entry with the smallest tick goes
/// first when capacity is reached. Expired entries are purged before anything
/// live is evicted.
pub struct ResultCache {
    entries: DashMap<CacheKey, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn purge_expired(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len()) as u64;
        if purged > 0 {
            self.expirations.fetch_add(purged, Ordering::Relaxed);
            debug!(purged = purged, "expired cache entries purged");
        }
    }

    fn evict_lru(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access())
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache entry evicted");
            }
        }
    }
}

impl CacheBackend for ResultCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedExtraction>, CacheError> {
        let now = Instant::now();

        let found = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn put(&self, key: CacheKey, value: CachedExtraction) -> Result<(), CacheError> {
        let now = Instant::now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired(now);
            while self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl: self.ttl,
                last_access: AtomicU64::new(self.tick()),
            },
        );
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KeyParts;
    use chrono::DateTime;

    fn key(text: &str) -> CacheKey {
        CacheKey::new(KeyParts {
            normalized_text: text,
            secondary_note: None,
            reference_time: DateTime::parse_from_rfc3339("2025-03-12T09:00:00Z").unwrap(),
            bucket_secs: 300,
            timezone: "UTC",
            locale: "en",
            fields: &Field::ALL,
        })
    }

    fn value(title: &str) -> CachedExtraction {
        let mut event = Event::empty("UTC");
        event.title = Some(title.to_string());
        CachedExtraction {
            event,
            field_results: FieldMap::new(),
            parsing_path: ParsingPath::new(),
            unconfirmed_fields: Vec::new(),
        }
    }

    #[test]
    fn put_then_get_hits() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        assert_eq!(cache.get(&key("a")).unwrap(), None);

        cache.put(key("a"), value("A")).unwrap();
        let hit = cache.get(&key("a")).unwrap().unwrap();
        assert_eq!(hit.event.title.as_deref(), Some("A"));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put(key("a"), value("A")).unwrap();
        cache.put(key("b"), value("B")).unwrap();

        // Touch "a" so "b" becomes the least recently used.
        cache.get(&key("a")).unwrap();
        cache.put(key("c"), value("C")).unwrap();

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put(key("a"), value("A")).unwrap();
        cache.put(key("b"), value("B")).unwrap();
        cache.put(key("a"), value("A2")).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ResultCache::new(4, Duration::from_millis(20));
        cache.put(key("a"), value("A")).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get(&key("a")).unwrap(), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn expired_entries_go_before_live_ones() {
        let cache = ResultCache::new(2, Duration::from_millis(20));
        cache.put(key("a"), value("A")).unwrap();
        cache.put(key("b"), value("B")).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        cache.put(key("c"), value("C")).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.expirations, 2);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.entries, 1);
    }
}
