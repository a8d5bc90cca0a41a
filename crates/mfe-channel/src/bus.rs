//! In-context event bus keyed by `(channel, key)`.
//!
//! The bus is the only link between a store engine and decoupled consumers:
//! the engine dispatches on [`EventName`]s derived from its channel name and
//! the written key, and consumers attach with the same pair, never holding a
//! reference to the engine.
//!
//! Lifecycle: an entry exists while at least one listener is registered under
//! its name. The [`Unsubscribe`] handle of the last listener removes the
//! entry. Engines never remove entries they did not create.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use serde_json::Value;
use tracing::trace;

use crate::listener::{Listener, ListenerId, ListenerSet, Unsubscribe};

/// Composite event name: the channel a store publishes on plus the key.
///
/// Kept as a pair rather than a joined string so that `("a:b", "c")` and
/// `("a", "b:c")` can never alias.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName {
    pub channel: String,
    pub key: String,
}

impl EventName {
    pub fn new(channel: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel, self.key)
    }
}

/// Payload dispatched on the bus.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub key: String,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

impl Change {
    pub fn new(key: impl Into<String>, new_value: Option<Value>, old_value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            new_value,
            old_value,
        }
    }
}

#[derive(Default)]
struct BusInner {
    listeners: RwLock<HashMap<EventName, ListenerSet>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, name: &EventName, id: ListenerId) -> bool {
        let mut map = self.listeners.write().expect("bus lock poisoned");
        let Some(set) = map.get_mut(name) else {
            return false;
        };
        let removed = set.remove(id);
        if set.is_empty() {
            map.remove(name);
        }
        removed
    }
}

/// Named-event dispatcher for one execution context.
///
/// Cloning yields another handle to the same bus. Most programs use
/// [`EventBus::global`]; separate instances model separate contexts in tests
/// or embedders that host several isolated contexts in one process.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

static GLOBAL_BUS: OnceLock<EventBus> = OnceLock::new();

impl EventBus {
    /// Create an empty, private bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bus.
    pub fn global() -> &'static EventBus {
        GLOBAL_BUS.get_or_init(EventBus::new)
    }

    /// Register `listener` under `name`.
    pub fn add_listener(&self, name: EventName, listener: Listener) -> Unsubscribe {
        let fresh = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let id = {
            let mut map = self.inner.listeners.write().expect("bus lock poisoned");
            map.entry(name.clone()).or_default().insert(fresh, listener)
        };
        trace!(event = %name, id = id.0, "bus listener added");

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(&name, id);
            }
        })
    }

    /// Remove a registration directly. Returns `true` if it was present.
    pub fn remove_listener(&self, name: &EventName, id: ListenerId) -> bool {
        self.inner.remove(name, id)
    }

    /// Invoke every listener registered under `name` with the change.
    ///
    /// Listeners run synchronously, in registration order, outside the bus
    /// lock. Returns the number of listeners invoked.
    pub fn dispatch(&self, name: &EventName, change: &Change) -> usize {
        let snapshot = {
            let map = self.inner.listeners.read().expect("bus lock poisoned");
            match map.get(name) {
                Some(set) => set.snapshot(),
                None => return 0,
            }
        };
        for listener in &snapshot {
            listener(change.new_value.as_ref(), change.old_value.as_ref());
        }
        trace!(event = %name, listeners = snapshot.len(), "bus dispatch");
        snapshot.len()
    }

    /// Number of listeners registered under `name`.
    pub fn listener_count(&self, name: &EventName) -> usize {
        let map = self.inner.listeners.read().expect("bus lock poisoned");
        map.get(name).map_or(0, ListenerSet::len)
    }

    /// Keys with at least one listener on `channel`, sorted.
    pub fn keys_for_channel(&self, channel: &str) -> Vec<String> {
        let map = self.inner.listeners.read().expect("bus lock poisoned");
        let mut keys: Vec<String> = map
            .keys()
            .filter(|name| name.channel == channel)
            .map(|name| name.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Attach to `(channel, key)` on this bus.
    pub fn subscribe_to_key(&self, channel: &str, key: &str, listener: Listener) -> Unsubscribe {
        self.add_listener(EventName::new(channel, key), listener)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.inner.listeners.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("event_names", &names).finish()
    }
}

/// Attach to `(channel, key)` on the process-wide bus.
///
/// The listener hears every change applied by any store engine in this
/// context that publishes on `channel`: local writes and inbound broadcasts
/// alike. It does not listen on the broadcast transport itself.
pub fn subscribe_to_key(channel: &str, key: &str, listener: Listener) -> Unsubscribe {
    EventBus::global().subscribe_to_key(channel, key, listener)
}
