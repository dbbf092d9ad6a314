//! Size-capped map with pluggable eviction.

use std::collections::HashMap;
use std::hash::Hash;

use super::EvictionPolicy;

/// Callback invoked with an evicted pair before it becomes unreachable.
pub type EvictCallback<K, V> = Box<dyn FnMut(&K, &V) + Send>;

/// A map capped at `max_size` entries.
///
/// Inserting into a full map evicts exactly one entry, chosen by the
/// eviction policy, and fires the callback exactly once before the entry is
/// dropped. The evicted pair is also returned so callers can keep dependent
/// structures consistent. Reads and writes both bump recency.
pub struct BoundedMap<K, V> {
    max_size: usize,
    policy: EvictionPolicy,
    map: HashMap<K, V>,
    /// Keys in insertion order (front = oldest)
    insertion: Vec<K>,
    /// Keys in recency order (front = least recently used)
    recency: Vec<K>,
    /// Access counts for LFU
    frequency: HashMap<K, u64>,
    on_evict: Option<EvictCallback<K, V>>,
}

impl<K: Eq + Hash + Clone, V> BoundedMap<K, V> {
    /// Create a map capped at `max_size` (at least 1).
    pub fn new(max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            max_size: max_size.max(1),
            policy,
            map: HashMap::new(),
            insertion: Vec::new(),
            recency: Vec::new(),
            frequency: HashMap::new(),
            on_evict: None,
        }
    }

    /// Register the eviction callback.
    pub fn with_on_evict(mut self, callback: EvictCallback<K, V>) -> Self {
        self.on_evict = Some(callback);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert a value. Returns the evicted pair when the cap forced one out.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.map.contains_key(&key) {
            self.map.insert(key.clone(), value);
            self.touch(&key);
            return None;
        }

        let evicted = if self.map.len() >= self.max_size {
            self.evict_one()
        } else {
            None
        };

        self.insertion.push(key.clone());
        self.recency.push(key.clone());
        self.frequency.insert(key.clone(), 0);
        self.map.insert(key, value);
        evicted
    }

    /// Fetch a value, bumping its recency and access count.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.touch(key);
        }
        self.map.get(key)
    }

    /// Fetch a value without disturbing eviction order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Remove a key explicitly. Does not fire the eviction callback.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.map.remove(key)?;
        self.insertion.retain(|k| k != key);
        self.recency.retain(|k| k != key);
        self.frequency.remove(key);
        Some(removed)
    }

    /// Keys in insertion order (oldest first).
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.insertion.iter()
    }

    /// Entries in insertion order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.insertion.iter().filter_map(|k| self.map.get(k).map(|v| (k, v)))
    }

    /// Values in insertion order (oldest first).
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Evict entries until `len() <= target`, firing the callback for each.
    /// Returns the evicted pairs, oldest victim first.
    pub fn evict_to(&mut self, target: usize) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.map.len() > target {
            match self.evict_one() {
                Some(pair) => evicted.push(pair),
                None => break,
            }
        }
        evicted
    }

    /// Drop everything without firing callbacks.
    pub fn clear(&mut self) {
        self.map.clear();
        self.insertion.clear();
        self.recency.clear();
        self.frequency.clear();
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            let k = self.recency.remove(pos);
            self.recency.push(k);
        }
        if let Some(count) = self.frequency.get_mut(key) {
            *count += 1;
        }
    }

    fn victim_key(&self) -> Option<K> {
        match self.policy {
            EvictionPolicy::Lru => self.recency.first().cloned(),
            EvictionPolicy::Fifo => self.insertion.first().cloned(),
            EvictionPolicy::Lfu => self
                .insertion
                .iter()
                .min_by_key(|k| self.frequency.get(*k).copied().unwrap_or(0))
                .cloned(),
        }
    }

    fn evict_one(&mut self) -> Option<(K, V)> {
        let key = self.victim_key()?;
        // Fire the callback while the pair is still reachable
        let value = self.map.get(&key)?;
        if let Some(callback) = self.on_evict.as_mut() {
            callback(&key, value);
        }
        let value = self.map.remove(&key)?;
        self.insertion.retain(|k| k != &key);
        self.recency.retain(|k| k != &key);
        self.frequency.remove(&key);
        Some((key, value))
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for BoundedMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedMap")
            .field("max_size", &self.max_size)
            .field("policy", &self.policy)
            .field("len", &self.map.len())
            .finish()
    }
}
