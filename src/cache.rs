//! Time-bounded cache for computed results.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Key/value cache whose entries expire a fixed time after insertion.
///
/// Keys are plain strings built hierarchically (`breakdown:<tenant>:<id>:...`)
/// so a whole family can be dropped with [`invalidate_prefix`](Self::invalidate_prefix).
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value, if present and younger than the TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().ok()?;
        let (inserted, value) = entries.get(key)?;
        (inserted.elapsed() < self.ttl).then(|| value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            let now = Instant::now();
            entries.retain(|_, (inserted, _)| now.duration_since(*inserted) < self.ttl);
            entries.insert(key.into(), (now, value));
        }
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many were
    /// removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|k, _| !k.starts_with(prefix));
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_insert() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("breakdown:t:1:all", 42);
        assert_eq!(cache.get("breakdown:t:1:all"), Some(42));
        assert_eq!(cache.get("breakdown:t:2:all"), None);
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("k", "v".to_string());
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("breakdown:t:1:all", 1);
        cache.insert("breakdown:t:1:sub-a", 2);
        cache.insert("breakdown:t:2:all", 3);
        assert_eq!(cache.invalidate_prefix("breakdown:t:1:"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("breakdown:t:2:all"), Some(3));
    }
}
