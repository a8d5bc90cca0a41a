use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde_json::Value;

/// In-memory mirror of the entries this context has read or written.
///
/// Once a key is present, the cache is authoritative for synchronous reads
/// of it. Every operation takes the lock for a single map access; the lock is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct Cache {
    entries: Mutex<HashMap<String, Value>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().expect("cache lock poisoned").get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().expect("cache lock poisoned").contains_key(key)
    }

    /// Store `value`, returning the previously cached value.
    pub fn insert(&self, key: &str, value: Value) -> Option<Value> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), value)
    }

    /// Store `value` unless the key is already cached; return what is cached.
    ///
    /// Used when hydrating from storage so a write that landed while the read
    /// was in flight is not overwritten by the older stored value.
    pub fn insert_if_absent(&self, key: &str, value: Value) -> Value {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .entry(key.to_string())
            .or_insert(value)
            .clone()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.lock().expect("cache lock poisoned").remove(key)
    }

    /// Overwrite cached entries with `entries`.
    pub fn merge(&self, entries: &BTreeMap<String, Value>) {
        let mut map = self.entries.lock().expect("cache lock poisoned");
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    /// Cached keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .expect("cache lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_returns_previous() {
        let cache = Cache::new();
        assert_eq!(cache.insert("k", json!(1)), None);
        assert_eq!(cache.insert("k", json!(2)), Some(json!(1)));
        assert_eq!(cache.get("k"), Some(json!(2)));
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let cache = Cache::new();
        assert_eq!(cache.insert_if_absent("k", json!("stored")), json!("stored"));
        cache.insert("k", json!("fresh"));
        assert_eq!(cache.insert_if_absent("k", json!("stale")), json!("fresh"));
    }

    #[test]
    fn merge_overwrites() {
        let cache = Cache::new();
        cache.insert("a", json!("stale"));
        let mut incoming = BTreeMap::new();
        incoming.insert("a".to_string(), json!("new"));
        incoming.insert("b".to_string(), json!(2));
        cache.merge(&incoming);
        assert_eq!(cache.get("a"), Some(json!("new")));
        assert_eq!(cache.keys(), vec!["a", "b"]);
    }

    #[test]
    fn remove_and_clear() {
        let cache = Cache::new();
        cache.insert("a", json!(1));
        cache.insert("b", json!(2));
        assert_eq!(cache.remove("a"), Some(json!(1)));
        assert_eq!(cache.remove("a"), None);
        assert!(cache.contains("b"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
