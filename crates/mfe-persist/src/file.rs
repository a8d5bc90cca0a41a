//! File-backed tables: one JSON document per `(database, table)` pair.
//!
//! Layout on disk:
//! ```text
//! <root>/<database>/<table>.json
//! ```
//!
//! Every mutation rewrites the whole document to a temporary file in the same
//! directory and renames it over the original, so readers never observe a
//! half-written table. Each load-modify-store step holds an advisory lock on
//! `<table>.json.lock`, which serializes writers across backends and
//! processes sharing the root. Within one backend, a per-path async lock
//! keeps waiting operations off the blocking pool.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PersistError, PersistResult};
use crate::traits::{Connection, PersistentBackend, TableConnection};

/// On-disk document format for a single table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    entries: BTreeMap<String, Value>,
}

/// Durable implementation of [`PersistentBackend`] rooted at a directory.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    root: PathBuf,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl JsonFileBackend {
    /// Create a backend storing its tables under `root`.
    ///
    /// The directory is created lazily on the first `open`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document holding `database`/`table`.
    pub fn table_path(&self, database: &str, table: &str) -> PathBuf {
        self.root.join(database).join(format!("{table}.json"))
    }

    fn lock_for(&self, path: &Path) -> PersistResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| PersistError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(locks.entry(path.to_path_buf()).or_default().clone())
    }
}

fn check_segment(database: &str, table: &str, segment: &str) -> PersistResult<()> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(&['/', '\\', '\0'][..]);
    if bad {
        return Err(PersistError::Open {
            database: database.to_string(),
            table: table.to_string(),
            reason: format!("{segment:?} is not a valid path segment"),
        });
    }
    Ok(())
}

#[async_trait]
impl PersistentBackend for JsonFileBackend {
    async fn open(&self, database: &str, table: &str) -> PersistResult<Connection> {
        check_segment(database, table, database)?;
        check_segment(database, table, table)?;

        let path = self.table_path(database, table);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let lock = self.lock_for(&path)?;
        debug!(path = %path.display(), "file table opened");
        Ok(Arc::new(FileTable { path, lock }))
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

/// Connection to one table document.
struct FileTable {
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

impl FileTable {
    /// Run `op` on the table's entries under the in-process lock and an OS
    /// file lock, writing the result back for [`Access::Write`].
    async fn run<R, F>(&self, access: Access, op: F) -> PersistResult<R>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || with_locked_table(&path, access, op))
            .await
            .map_err(|e| PersistError::Unavailable(format!("table task failed: {e}")))?
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("json.lock")
}

/// Load, apply `op`, and for writes store the table, all while holding an
/// advisory lock on the sibling `.lock` file. The lock is shared with other
/// backends and other processes using the same root.
fn with_locked_table<R>(
    path: &Path,
    access: Access,
    op: impl FnOnce(&mut BTreeMap<String, Value>) -> R,
) -> PersistResult<R> {
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path(path))?;
    let mut lock = fd_lock::RwLock::new(lock_file);

    match access {
        Access::Read => {
            let _shared = lock.read()?;
            let mut file = load(path)?;
            Ok(op(&mut file.entries))
        }
        Access::Write => {
            let _exclusive = lock.write()?;
            let mut file = load(path)?;
            let out = op(&mut file.entries);
            store(path, &file)?;
            Ok(out)
        }
    }
}

fn load(path: &Path) -> PersistResult<TableFile> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TableFile::default()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| PersistError::CorruptTable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write to a uniquely named temp file in the same directory, then rename it
/// over the table.
fn store(path: &Path, file: &TableFile) -> PersistResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, file)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        warn!(path = %path.display(), error = %e.error, "failed to replace table file");
        PersistError::Io(e.error)
    })?;
    debug!(path = %path.display(), entries = file.entries.len(), "table written");
    Ok(())
}

#[async_trait]
impl TableConnection for FileTable {
    async fn get(&self, key: &str) -> PersistResult<Option<Value>> {
        let key = key.to_string();
        self.run(Access::Read, move |entries| entries.remove(&key))
            .await
    }

    async fn put(&self, key: &str, value: &Value) -> PersistResult<()> {
        let (key, value) = (key.to_string(), value.clone());
        self.run(Access::Write, move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn delete(&self, key: &str) -> PersistResult<()> {
        let key = key.to_string();
        self.run(Access::Write, move |entries| {
            entries.remove(&key);
        })
        .await
    }

    async fn entries(&self) -> PersistResult<BTreeMap<String, Value>> {
        self.run(Access::Read, |entries| std::mem::take(entries)).await
    }

    async fn clear(&self) -> PersistResult<()> {
        self.run(Access::Write, |entries| entries.clear()).await
    }
}
