//! Client-side state store for micro-frontends.
//!
//! A [`StoreEngine`] keeps a key-value map in an in-memory [`cache`], persists
//! every write through a [`mfe_persist::PersistentBackend`], and keeps other
//! contexts that share its channel name in sync over a
//! [`mfe_channel::BroadcastTransport`]. Consumers that never see the engine
//! can still follow a key through [`subscribe_to_key`].
//!
//! ```no_run
//! # async fn demo() -> mfe_store::StoreResult<()> {
//! use mfe_store::{listener, subscribe_to_key, StoreConfig, StoreEngine};
//! use serde_json::json;
//!
//! let store = StoreEngine::builder(StoreConfig::for_database("shell")).build()?;
//! let _sub = subscribe_to_key("shell", "user", listener(|new, _old| {
//!     println!("user is now {new:?}");
//! }));
//! store.set("user", json!({"name": "Alice"})).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Consistency
//!
//! A write updates the cache before the backend acknowledges it. If the
//! backend then fails, the error is returned and the cache is not rolled
//! back. Concurrent writers to one key resolve by whichever backend commit
//! lands last; there is no versioning.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod subscriptions;
mod sync;
pub mod validators;

pub use config::{StoreConfig, DEFAULT_DATABASE_NAME, DEFAULT_TABLE_NAME};
pub use engine::{StoreEngine, StoreEngineBuilder};
pub use error::{StoreError, StoreResult};
pub use subscriptions::SubscriptionRegistry;
pub use validators::{Validator, ValidatorRegistry, ValueKind};

pub use mfe_channel::{
    listener, subscribe_to_key, BroadcastMessage, BroadcastTransport, ChannelHandle, EventBus,
    EventName, Listener, LocalBroadcastHub, MessageHandler, TransportError, Unsubscribe,
};
pub use mfe_persist::{JsonFileBackend, MemoryBackend, PersistentBackend};
