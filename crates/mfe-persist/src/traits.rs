use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PersistResult;

/// Shared handle to an open table.
pub type Connection = Arc<dyn TableConnection>;

/// Entry point of a storage backend.
///
/// Opening is the only step that may create the database or table. The
/// returned connection is cheap to clone and is shared by every operation of
/// one store engine.
#[async_trait]
pub trait PersistentBackend: Send + Sync {
    /// Open (creating if needed) the table `table` inside `database`.
    async fn open(&self, database: &str, table: &str) -> PersistResult<Connection>;

    /// Short human-readable backend name, used in logs.
    fn name(&self) -> &str;
}

/// An open `(database, table)` pair.
///
/// All operations are asynchronous and may fail with a storage-layer error.
/// Implementations serialize their own writes; callers hold no locks.
#[async_trait]
pub trait TableConnection: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> PersistResult<Option<Value>>;

    /// Create or overwrite the value under `key`.
    async fn put(&self, key: &str, value: &Value) -> PersistResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> PersistResult<()>;

    /// Enumerate every key/value pair in the table.
    async fn entries(&self) -> PersistResult<BTreeMap<String, Value>>;

    /// Remove every entry in the table.
    async fn clear(&self) -> PersistResult<()>;
}
