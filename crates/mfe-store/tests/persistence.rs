//! Storage failures and durable backends.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mfe_persist::{Connection, PersistError, PersistResult, TableConnection};
use mfe_store::{
    listener, BroadcastMessage, BroadcastTransport, ChannelHandle, EventBus, JsonFileBackend,
    LocalBroadcastHub, MemoryBackend, MessageHandler, PersistentBackend, StoreConfig, StoreEngine,
    StoreError, TransportError,
};
use serde_json::{json, Value};

/// Backend whose writes fail while `failing` is set.
#[derive(Clone, Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    failing: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

struct FlakyTable {
    inner: Connection,
    failing: Arc<AtomicBool>,
}

impl FlakyTable {
    fn check(&self) -> PersistResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PersistError::Unavailable("disk on fire".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistentBackend for FlakyBackend {
    async fn open(&self, database: &str, table: &str) -> PersistResult<Connection> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FlakyTable {
            inner: self.inner.open(database, table).await?,
            failing: self.failing.clone(),
        }))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[async_trait]
impl TableConnection for FlakyTable {
    async fn get(&self, key: &str) -> PersistResult<Option<Value>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &Value) -> PersistResult<()> {
        self.check()?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> PersistResult<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn entries(&self) -> PersistResult<BTreeMap<String, Value>> {
        self.inner.entries().await
    }

    async fn clear(&self) -> PersistResult<()> {
        self.check()?;
        self.inner.clear().await
    }
}

/// Transport whose handles accept a handler but fail every post.
struct FailingTransport {
    posts: Arc<AtomicUsize>,
}

struct FailingHandle {
    name: String,
    posts: Arc<AtomicUsize>,
}

impl BroadcastTransport for FailingTransport {
    fn open(&self, channel_name: &str) -> Result<Box<dyn ChannelHandle>, TransportError> {
        Ok(Box::new(FailingHandle {
            name: channel_name.to_string(),
            posts: self.posts.clone(),
        }))
    }
}

impl ChannelHandle for FailingHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, _message: &BroadcastMessage) -> Result<(), TransportError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Closed(self.name.clone()))
    }

    fn on_message(&self, _handler: MessageHandler) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn failed_post_never_fails_a_write() {
    let backend = MemoryBackend::new();
    let posts = Arc::new(AtomicUsize::new(0));
    let engine = StoreEngine::builder(StoreConfig::default())
        .backend(backend.clone())
        .transport(FailingTransport {
            posts: posts.clone(),
        })
        .event_bus(EventBus::new())
        .build()
        .unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let s = seen.clone();
    let _sub = engine.subscribe(
        "k",
        listener(move |new, old| s.lock().unwrap().push((new.cloned(), old.cloned()))),
    );

    engine.set("k", json!(1)).await.unwrap();
    assert_eq!(
        backend.snapshot("mfe-store", "store").get("k"),
        Some(&json!(1))
    );

    engine.delete("k").await.unwrap();
    assert!(backend.snapshot("mfe-store", "store").is_empty());

    engine.set("other", json!(2)).await.unwrap();
    engine.clear().await.unwrap();
    assert!(backend.snapshot("mfe-store", "store").is_empty());

    assert_eq!(posts.load(Ordering::SeqCst), 4);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (Some(json!(1)), None),
            (None, Some(json!(1))),
            (None, None),
        ]
    );
}

#[tokio::test]
async fn failed_put_keeps_cache_and_stays_silent() {
    let backend = FlakyBackend::default();
    let hub = LocalBroadcastHub::new();
    let bus = EventBus::new();
    let engine = StoreEngine::builder(StoreConfig::default())
        .backend(backend.clone())
        .transport(hub.clone())
        .event_bus(bus.clone())
        .build()
        .unwrap();
    let peer = StoreEngine::builder(StoreConfig::default())
        .backend(backend.clone())
        .transport(hub)
        .event_bus(EventBus::new())
        .build()
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = |calls: &Arc<AtomicUsize>| {
        let c = calls.clone();
        listener(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    };
    let _local = engine.subscribe("k", counter(&calls));
    let _bus = bus.subscribe_to_key("mfe-store", "k", counter(&calls));
    let _remote = peer.subscribe("k", counter(&calls));

    backend.failing.store(true, Ordering::SeqCst);
    let err = engine.set("k", json!("unsaved")).await.unwrap_err();
    assert!(err.is_persistence());
    assert!(matches!(err, StoreError::Persistence(PersistError::Unavailable(_))));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The cache advanced even though storage did not.
    assert_eq!(engine.get("k").await.unwrap(), Some(json!("unsaved")));
    assert!(backend.inner.snapshot("mfe-store", "store").is_empty());
    assert_eq!(peer.get("k").await.unwrap(), None);

    backend.failing.store(false, Ordering::SeqCst);
    engine.set("k", json!("saved")).await.unwrap();
    assert_eq!(
        backend.inner.snapshot("mfe-store", "store").get("k"),
        Some(&json!("saved"))
    );
}

#[tokio::test]
async fn connection_is_opened_once() {
    let backend = FlakyBackend::default();
    let engine = StoreEngine::builder(StoreConfig::default())
        .backend(backend.clone())
        .transport(LocalBroadcastHub::new())
        .event_bus(EventBus::new())
        .build()
        .unwrap();
    assert_eq!(backend.opens.load(Ordering::SeqCst), 0);

    engine.set("a", json!(1)).await.unwrap();
    engine.get("b").await.unwrap();
    engine.delete("a").await.unwrap();
    engine.get_all().await.unwrap();
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::for_database("shell").with_table("state");

    let first = StoreEngine::builder(config.clone())
        .backend(JsonFileBackend::new(dir.path()))
        .transport(LocalBroadcastHub::new())
        .event_bus(EventBus::new())
        .build()
        .unwrap();
    first.set("user", json!({"name": "Alice"})).await.unwrap();
    first.set("count", json!(3)).await.unwrap();
    first.delete("count").await.unwrap();
    first.destroy();

    let second = StoreEngine::builder(config)
        .backend(JsonFileBackend::new(dir.path()))
        .transport(LocalBroadcastHub::new())
        .event_bus(EventBus::new())
        .build()
        .unwrap();
    let all = second.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all.get("user"), Some(&json!({"name": "Alice"})));
    assert!(dir.path().join("shell").join("state.json").exists());
}

#[tokio::test]
async fn tables_are_scoped_by_name() {
    let backend = MemoryBackend::new();
    let build = |table: &str| {
        StoreEngine::builder(StoreConfig::default().with_table(table))
            .backend(backend.clone())
            .transport(LocalBroadcastHub::new())
            .event_bus(EventBus::new())
            .build()
            .unwrap()
    };
    let prefs = build("prefs");
    let session = build("session");

    prefs.set("theme", json!("dark")).await.unwrap();
    assert_eq!(session.get("theme").await.unwrap(), None);
    assert_eq!(backend.table_count(), 2);
}
