use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use mfe_channel::{
    BroadcastMessage, BroadcastTransport, Change, ChannelHandle, EventBus, EventName,
    LocalBroadcastHub, Listener, MessageHandler, Unsubscribe,
};
use mfe_persist::{Connection, MemoryBackend, PersistentBackend};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::subscriptions::SubscriptionRegistry;
use crate::validators::{Validator, ValidatorRegistry};

/// State shared between the engine handle and its inbound message handler.
pub(crate) struct EngineInner {
    pub(crate) config: StoreConfig,
    pub(crate) cache: Cache,
    pub(crate) subscriptions: SubscriptionRegistry,
    validators: ValidatorRegistry,
    pub(crate) bus: EventBus,
    backend: Arc<dyn PersistentBackend>,
    connection: Mutex<Option<Connection>>,
    channel: Mutex<Option<Box<dyn ChannelHandle>>>,
    pub(crate) destroyed: AtomicBool,
}

impl EngineInner {
    pub(crate) fn channel_name(&self) -> &str {
        self.config.channel_name()
    }

    /// Fan a change out to local listeners, then to the event bus.
    pub(crate) fn notify(&self, key: &str, new_value: Option<&Value>, old_value: Option<&Value>) {
        let listeners = self.subscriptions.notify(key, new_value, old_value);
        let change = Change::new(key, new_value.cloned(), old_value.cloned());
        let bus_listeners = self
            .bus
            .dispatch(&EventName::new(self.channel_name(), key), &change);
        debug!(key, listeners, bus_listeners, "change notified");
    }

    /// Notify `(None, None)` to every key anyone in this context listens on.
    pub(crate) fn notify_cleared(&self) {
        let keys: BTreeSet<String> = self
            .subscriptions
            .keys()
            .into_iter()
            .chain(self.bus.keys_for_channel(self.channel_name()))
            .collect();
        for key in &keys {
            self.notify(key, None, None);
        }
    }

    /// Best-effort post to other contexts. Failures are logged, never returned.
    fn post(&self, message: BroadcastMessage) {
        let channel = self.channel.lock().expect("channel lock poisoned");
        let Some(handle) = channel.as_ref() else {
            return;
        };
        if let Err(e) = handle.post(&message) {
            warn!(channel = handle.name(), kind = message.kind(), error = %e, "broadcast failed");
        }
    }

    /// The shared persistent connection, opened on first use.
    async fn connection(&self) -> StoreResult<Connection> {
        let cached = self.connection.lock().expect("connection lock poisoned").clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let opened = self
            .backend
            .open(&self.config.database_name, &self.config.table_name)
            .await?;
        debug!(
            backend = self.backend.name(),
            database = %self.config.database_name,
            table = %self.config.table_name,
            "persistent connection opened"
        );

        // Torn down while opening: do not repopulate the emptied slot.
        self.ensure_live()?;

        // Another operation may have opened one while we were waiting.
        let mut slot = self.connection.lock().expect("connection lock poisoned");
        Ok(slot.get_or_insert(opened).clone())
    }

    fn ensure_live(&self) -> StoreResult<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(StoreError::Destroyed)
        } else {
            Ok(())
        }
    }
}

/// Builder for [`StoreEngine`].
///
/// Defaults: an ephemeral [`MemoryBackend`], the process-wide
/// [`LocalBroadcastHub`], and the process-wide [`EventBus`].
pub struct StoreEngineBuilder {
    config: StoreConfig,
    backend: Option<Arc<dyn PersistentBackend>>,
    transport: Option<Arc<dyn BroadcastTransport>>,
    bus: Option<EventBus>,
    validators: Vec<(String, Validator)>,
}

impl StoreEngineBuilder {
    pub fn backend<B: PersistentBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn PersistentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn transport<T: BroadcastTransport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// The bus this engine's context dispatches on.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Register the validator for `key`. At most one per key.
    pub fn validator<F>(mut self, key: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push((key.into(), Arc::new(check)));
        self
    }

    /// Register a prebuilt validator, such as one from [`crate::validators`].
    pub fn validator_fn(mut self, key: impl Into<String>, validator: Validator) -> Self {
        self.validators.push((key.into(), validator));
        self
    }

    /// Validate the configuration, join the broadcast channel, and start
    /// applying inbound messages.
    ///
    /// Must be called inside a Tokio runtime: inbound delivery runs on it.
    pub fn build(self) -> StoreResult<StoreEngine> {
        self.config.validate()?;
        let validators = ValidatorRegistry::from_entries(self.validators)?;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let transport: Arc<dyn BroadcastTransport> = self
            .transport
            .unwrap_or_else(|| Arc::new(LocalBroadcastHub::global().clone()));
        let bus = self.bus.unwrap_or_else(|| EventBus::global().clone());

        let handle = transport.open(self.config.channel_name())?;

        let inner = Arc::new(EngineInner {
            config: self.config,
            cache: Cache::new(),
            subscriptions: SubscriptionRegistry::new(),
            validators,
            bus,
            backend,
            connection: Mutex::new(None),
            channel: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let weak: Weak<EngineInner> = Arc::downgrade(&inner);
        let handler: MessageHandler = Arc::new(move |message: BroadcastMessage| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_remote(message);
            }
        });
        handle.on_message(handler)?;
        *inner.channel.lock().expect("channel lock poisoned") = Some(handle);

        info!(
            database = %inner.config.database_name,
            table = %inner.config.table_name,
            channel = inner.channel_name(),
            validators = inner.validators.len(),
            "store engine started"
        );
        Ok(StoreEngine { inner })
    }
}

/// Cache-backed, persisted key-value store synchronized across contexts.
///
/// Writes are validated, committed to the cache, persisted, fanned out to
/// local listeners and the event bus, then posted to other contexts, in that
/// order. Inbound messages from other contexts update the cache and notify
/// locally but are never persisted or re-posted.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct StoreEngine {
    inner: Arc<EngineInner>,
}

impl StoreEngine {
    pub fn builder(config: StoreConfig) -> StoreEngineBuilder {
        StoreEngineBuilder {
            config,
            backend: None,
            transport: None,
            bus: None,
            validators: Vec::new(),
        }
    }

    /// Read `key`, from the cache when present, else from storage.
    ///
    /// A storage hit populates the cache; a miss leaves it untouched.
    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.inner.ensure_live()?;
        if let Some(value) = self.inner.cache.get(key) {
            return Ok(Some(value));
        }

        let conn = self.inner.connection().await?;
        let stored = conn.get(key).await?;
        self.inner.ensure_live()?;
        debug!(key, hit = stored.is_some(), "cache miss hydrated from storage");
        Ok(stored.map(|value| self.inner.cache.insert_if_absent(key, value)))
    }

    /// Write `value` under `key`.
    ///
    /// On a validation failure nothing happens. On a persistence failure the
    /// cache keeps the new value, no notification is sent, and the error is
    /// returned; the caller decides whether to retry.
    pub async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.inner.ensure_live()?;
        self.inner.validators.check(key, &value)?;

        let old_value = self.inner.cache.insert(key, value.clone());

        let conn = self.inner.connection().await?;
        conn.put(key, &value).await?;
        self.inner.ensure_live()?;

        self.inner.notify(key, Some(&value), old_value.as_ref());
        self.inner.post(BroadcastMessage::Set {
            key: key.to_string(),
            value,
            old_value,
        });
        Ok(())
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.ensure_live()?;
        let old_value = self.inner.cache.remove(key);

        let conn = self.inner.connection().await?;
        conn.delete(key).await?;
        self.inner.ensure_live()?;

        self.inner.notify(key, None, old_value.as_ref());
        self.inner.post(BroadcastMessage::Delete {
            key: key.to_string(),
            old_value,
        });
        Ok(())
    }

    /// Every stored entry. Refreshes the cache with what storage returns.
    pub async fn get_all(&self) -> StoreResult<BTreeMap<String, Value>> {
        self.inner.ensure_live()?;
        let conn = self.inner.connection().await?;
        let entries = conn.entries().await?;
        self.inner.ensure_live()?;
        self.inner.cache.merge(&entries);
        debug!(count = entries.len(), "all entries loaded");
        Ok(entries)
    }

    /// Remove every entry, here and in storage.
    ///
    /// Every key with a listener in this context, registered on the engine or
    /// on the event bus under this channel, is notified with `(None, None)`.
    pub async fn clear(&self) -> StoreResult<()> {
        self.inner.ensure_live()?;
        self.inner.cache.clear();

        let conn = self.inner.connection().await?;
        conn.clear().await?;
        self.inner.ensure_live()?;

        self.inner.notify_cleared();
        self.inner.post(BroadcastMessage::Clear);
        Ok(())
    }

    /// Listen for changes to `key`.
    ///
    /// On a destroyed engine this registers nothing and returns an inert
    /// handle.
    pub fn subscribe(&self, key: &str, listener: Listener) -> Unsubscribe {
        if self.is_destroyed() {
            debug!(key, "subscribe on destroyed store ignored");
            return Unsubscribe::noop();
        }
        self.inner.subscriptions.subscribe(key, listener)
    }

    /// Read `key` and deserialize it into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Serialize `value` and write it under `key`.
    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set(key, value).await
    }

    /// Tear the engine down.
    ///
    /// Leaves the broadcast channel, drops the cache, every listener, and the
    /// persistent connection. Stored data is kept. Idempotent; afterwards
    /// every data operation fails with [`StoreError::Destroyed`].
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.channel.lock().expect("channel lock poisoned").take() {
            handle.close();
        }
        self.inner.cache.clear();
        self.inner.subscriptions.clear();
        self.inner
            .connection
            .lock()
            .expect("connection lock poisoned")
            .take();
        info!(channel = self.inner.channel_name(), "store engine destroyed");
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn channel_name(&self) -> &str {
        self.inner.channel_name()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Keys currently held in the cache, sorted.
    pub fn cached_keys(&self) -> Vec<String> {
        self.inner.cache.keys()
    }

    /// Number of engine-level listeners on `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.subscriptions.listener_count(key)
    }

    /// The event bus this engine dispatches on.
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &EngineInner {
        &self.inner
    }
}

impl std::fmt::Debug for StoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEngine")
            .field("config", &self.inner.config)
            .field("cached", &self.inner.cache.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
