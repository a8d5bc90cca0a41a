//! In-memory tables shared by every clone of a [`MemoryBackend`].
//!
//! Cloning the backend does not copy data: all clones address the same set
//! of tables, the way every tab of one origin addresses the same browser
//! database. Data is lost when the last clone is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{PersistError, PersistResult};
use crate::traits::{Connection, PersistentBackend, TableConnection};

type Table = Arc<RwLock<BTreeMap<String, Value>>>;

/// Shared in-memory implementation of [`PersistentBackend`].
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<HashMap<(String, String), Table>>>,
}

impl MemoryBackend {
    /// Create a backend with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents of one table, empty if it was never opened.
    pub fn snapshot(&self, database: &str, table: &str) -> BTreeMap<String, Value> {
        let tables = self.tables.read().expect("lock poisoned");
        tables
            .get(&(database.to_string(), table.to_string()))
            .map(|t| t.read().expect("lock poisoned").clone())
            .unwrap_or_default()
    }

    /// Number of tables opened so far.
    pub fn table_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("table_count", &self.table_count())
            .finish()
    }
}

#[async_trait]
impl PersistentBackend for MemoryBackend {
    async fn open(&self, database: &str, table: &str) -> PersistResult<Connection> {
        let mut tables = self.tables.write().map_err(|e| poisoned(&e))?;
        let data = tables
            .entry((database.to_string(), table.to_string()))
            .or_default()
            .clone();
        debug!(database, table, "memory table opened");
        Ok(Arc::new(MemoryTable { data }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Connection to one in-memory table.
struct MemoryTable {
    data: Table,
}

#[async_trait]
impl TableConnection for MemoryTable {
    async fn get(&self, key: &str) -> PersistResult<Option<Value>> {
        let data = self.data.read().map_err(|e| poisoned(&e))?;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> PersistResult<()> {
        let mut data = self.data.write().map_err(|e| poisoned(&e))?;
        data.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> PersistResult<()> {
        let mut data = self.data.write().map_err(|e| poisoned(&e))?;
        data.remove(key);
        Ok(())
    }

    async fn entries(&self) -> PersistResult<BTreeMap<String, Value>> {
        let data = self.data.read().map_err(|e| poisoned(&e))?;
        Ok(data.clone())
    }

    async fn clear(&self) -> PersistResult<()> {
        let mut data = self.data.write().map_err(|e| poisoned(&e))?;
        data.clear();
        Ok(())
    }
}

fn poisoned<E: std::fmt::Display>(err: &E) -> PersistError {
    PersistError::Unavailable(format!("lock poisoned: {err}"))
}
