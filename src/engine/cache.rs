// Time-boxed read-through cache shared by the engine services

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Key → value cache where every entry expires after a fixed TTL.
///
/// Writers invalidate the keys they touch; expiry only bounds how stale an
/// entry can get when a write happens outside this process.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, inserted) = entry.value();
                if inserted.elapsed() < self.ttl {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn invalidate_where<F>(&self, mut predicate: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.entries.retain(|key, _| !predicate(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_invalidate() {
        let cache: TtlCache<(u32, &'static str), Option<String>> = TtlCache::new(Duration::from_secs(60));
        cache.insert((1, "a"), Some("ana".to_string()));
        cache.insert((1, "b"), None);
        cache.insert((2, "a"), Some("bia".to_string()));

        assert_eq!(cache.get(&(1, "a")), Some(Some("ana".to_string())));
        assert_eq!(cache.get(&(1, "b")), Some(None));
        assert_eq!(cache.get(&(3, "a")), None);

        cache.invalidate_where(|(process, _)| *process == 1);
        assert_eq!(cache.get(&(1, "a")), None);
        assert_eq!(cache.len(), 1);

        cache.invalidate(&(2, "a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_millis(0));
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }
}
