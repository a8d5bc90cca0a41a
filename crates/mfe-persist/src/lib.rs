//! Durable keyed storage for the micro-frontend state store.
//!
//! The store engine never talks to a concrete database. It opens a
//! [`TableConnection`] through a [`PersistentBackend`] scoped to a
//! `(database, table)` pair and performs asynchronous get/put/delete/clear
//! and full enumeration against it.
//!
//! # Backends
//!
//! - [`MemoryBackend`] -- shared in-process tables; clones see the same data,
//!   which makes it the natural stand-in for one origin's storage when several
//!   contexts live in one process.
//! - [`JsonFileBackend`] -- one JSON document per table on disk, replaced
//!   atomically on every write.
//!
//! # Design Rules
//!
//! 1. Keys are unique within one `(database, table)` pair.
//! 2. Values are opaque `serde_json::Value`s; backends never interpret them.
//! 3. Concurrent writes to the same key resolve last-write-wins in the order
//!    the backend commits them.
//! 4. All storage failures are propagated as [`PersistError`].

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{PersistError, PersistResult};
pub use file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use traits::{Connection, PersistentBackend, TableConnection};
