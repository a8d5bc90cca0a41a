//! Applying broadcast messages that arrive from other contexts.
//!
//! The sender has already persisted the change, so an inbound message only
//! touches this context's cache and listeners. It is never persisted again
//! and never re-posted.

use std::sync::atomic::Ordering;

use mfe_channel::BroadcastMessage;
use tracing::debug;

use crate::engine::EngineInner;

impl EngineInner {
    pub(crate) fn apply_remote(&self, message: BroadcastMessage) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        debug!(
            channel = self.channel_name(),
            kind = message.kind(),
            key = message.key(),
            "applying remote change"
        );
        match message {
            BroadcastMessage::Set {
                key,
                value,
                old_value,
            } => {
                self.cache.insert(&key, value.clone());
                self.notify(&key, Some(&value), old_value.as_ref());
            }
            BroadcastMessage::Delete { key, old_value } => {
                self.cache.remove(&key);
                self.notify(&key, None, old_value.as_ref());
            }
            BroadcastMessage::Clear => {
                self.cache.clear();
                self.notify_cleared();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use mfe_channel::{listener, EventBus, LocalBroadcastHub};
    use mfe_persist::MemoryBackend;
    use serde_json::{json, Value};

    use crate::{StoreConfig, StoreEngine};

    use super::*;

    type Seen = Arc<Mutex<Vec<(Option<Value>, Option<Value>)>>>;

    fn engine() -> StoreEngine {
        StoreEngine::builder(StoreConfig::default())
            .backend(MemoryBackend::new())
            .transport(LocalBroadcastHub::new())
            .event_bus(EventBus::new())
            .build()
            .unwrap()
    }

    fn watch(engine: &StoreEngine, key: &str) -> Seen {
        let seen: Seen = Arc::default();
        let s = seen.clone();
        // Dropping the handle keeps the registration.
        let _ = engine.subscribe(
            key,
            listener(move |new, old| s.lock().unwrap().push((new.cloned(), old.cloned()))),
        );
        seen
    }

    #[tokio::test]
    async fn remote_set_reports_senders_old_value() {
        let engine = engine();
        let seen = watch(&engine, "user");

        engine.inner().apply_remote(BroadcastMessage::Set {
            key: "user".into(),
            value: json!("Bob"),
            old_value: Some(json!("Alice")),
        });

        assert_eq!(engine.get("user").await.unwrap(), Some(json!("Bob")));
        assert_eq!(*seen.lock().unwrap(), vec![(Some(json!("Bob")), Some(json!("Alice")))]);
    }

    #[tokio::test]
    async fn remote_changes_are_not_persisted() {
        let backend = MemoryBackend::new();
        let engine = StoreEngine::builder(StoreConfig::default())
            .backend(backend.clone())
            .transport(LocalBroadcastHub::new())
            .event_bus(EventBus::new())
            .build()
            .unwrap();

        engine.inner().apply_remote(BroadcastMessage::Set {
            key: "k".into(),
            value: json!(1),
            old_value: None,
        });
        assert_eq!(engine.cached_keys(), vec!["k"]);
        assert!(backend.snapshot("mfe-store", "store").is_empty());
    }

    #[tokio::test]
    async fn remote_delete_and_clear() {
        let engine = engine();
        engine.set("a", json!(1)).await.unwrap();
        let a = watch(&engine, "a");
        let b = watch(&engine, "b");

        engine.inner().apply_remote(BroadcastMessage::Delete {
            key: "a".into(),
            old_value: Some(json!(1)),
        });
        assert!(engine.cached_keys().is_empty());

        engine.inner().apply_remote(BroadcastMessage::Clear);
        assert_eq!(*a.lock().unwrap(), vec![(None, Some(json!(1))), (None, None)]);
        assert_eq!(*b.lock().unwrap(), vec![(None, None)]);
    }

    #[tokio::test]
    async fn ignored_after_destroy() {
        let engine = engine();
        engine.destroy();
        engine.inner().apply_remote(BroadcastMessage::Set {
            key: "k".into(),
            value: json!(1),
            old_value: None,
        });
        assert!(engine.cached_keys().is_empty());
    }
}
