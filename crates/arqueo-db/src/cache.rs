//! # Bounded TTL Cache
//!
//! A small in-process cache for state-registry lookups.
//!
//! ## Invalidation Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Configuration write (deactivate state, edit rule)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  invalidate(THE key that changed)   ← per-key, explicit                │
//! │                                                                         │
//! │  NEVER: "forget everything matching a pattern". Wildcard sweeps are    │
//! │  unreliable across store backends; each write knows exactly which      │
//! │  keys it touched.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries also expire on their own after the TTL, and the cache is
//! capacity-bounded: when full, the entry closest to expiry is evicted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A cached value and its expiry deadline.
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe TTL cache with per-key invalidation and a capacity bound.
///
/// Clones share the same underlying map, so every repository handle built
/// from the same `Database` sees the same cache.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Arc<Mutex<HashMap<K, Entry<V>>>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        TtlCache {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
            capacity: self.capacity,
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        TtlCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns the cached value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");

        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts a value, evicting if at capacity.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let now = Instant::now();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.retain(|_, e| e.expires_at > now);

            // Still full after dropping expired entries: evict the entry
            // closest to expiry.
            if entries.len() >= self.capacity {
                if let Some(victim) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Removes exactly one key. Configuration writes call this for every
    /// key they touched.
    pub fn invalidate(&self, key: &K) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .remove(key);
    }

    /// Number of entries currently held (expired ones included until
    /// touched).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let cache: TtlCache<String, i64> = TtlCache::new(Duration::from_secs(60), 16);

        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expiry() {
        let cache: TtlCache<String, i64> = TtlCache::new(Duration::from_millis(0), 16);

        cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_per_key_invalidation_leaves_others_alone() {
        let cache: TtlCache<String, i64> = TtlCache::new(Duration::from_secs(60), 16);

        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        cache.invalidate(&"a".to_string());

        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[test]
    fn test_capacity_bound() {
        let cache: TtlCache<i64, i64> = TtlCache::new(Duration::from_secs(60), 2);

        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache: TtlCache<String, i64> = TtlCache::new(Duration::from_secs(60), 16);
        let other = cache.clone();

        cache.insert("a".to_string(), 1);
        assert_eq!(other.get(&"a".to_string()), Some(1));

        other.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
    }
}
