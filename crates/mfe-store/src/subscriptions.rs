use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use mfe_channel::{Listener, ListenerId, ListenerSet, Unsubscribe};
use serde_json::Value;

#[derive(Default)]
struct RegistryInner {
    keys: RwLock<HashMap<String, ListenerSet>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, key: &str, id: ListenerId) {
        let mut keys = self.keys.write().expect("registry lock poisoned");
        if let Some(set) = keys.get_mut(key) {
            set.remove(id);
            if set.is_empty() {
                keys.remove(key);
            }
        }
    }
}

/// Per-key listeners owned by one store engine.
///
/// A key is tracked only while it has at least one listener.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `key`.
    ///
    /// The returned handle removes exactly this registration and is
    /// idempotent. It holds only a weak reference to the registry.
    pub fn subscribe(&self, key: &str, listener: Listener) -> Unsubscribe {
        let fresh = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let id = {
            let mut keys = self.inner.keys.write().expect("registry lock poisoned");
            keys.entry(key.to_string()).or_default().insert(fresh, listener)
        };

        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(&key, id);
            }
        })
    }

    /// Invoke the listeners of `key` in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn notify(&self, key: &str, new_value: Option<&Value>, old_value: Option<&Value>) -> usize {
        let snapshot = {
            let keys = self.inner.keys.read().expect("registry lock poisoned");
            match keys.get(key) {
                Some(set) => set.snapshot(),
                None => return 0,
            }
        };
        for listener in &snapshot {
            listener(new_value, old_value);
        }
        snapshot.len()
    }

    /// Keys with at least one listener, sorted.
    pub fn keys(&self) -> Vec<String> {
        let keys = self.inner.keys.read().expect("registry lock poisoned");
        let mut out: Vec<String> = keys.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn listener_count(&self, key: &str) -> usize {
        let keys = self.inner.keys.read().expect("registry lock poisoned");
        keys.get(key).map_or(0, ListenerSet::len)
    }

    /// Drop every listener. Outstanding handles become no-ops.
    pub fn clear(&self) {
        self.inner.keys.write().expect("registry lock poisoned").clear();
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.keys.read().map(|k| k.len()).unwrap_or(0);
        f.debug_struct("SubscriptionRegistry")
            .field("key_count", &count)
            .finish()
    }
}
