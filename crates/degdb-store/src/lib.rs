//! # degdb-store
//!
//! Local triple storage backed by SQLite. Every degdb node keeps its own
//! shard of the global triple set in a single `triples` table; this crate
//! owns the schema, migrations, and the [`triples::TripleStore`] query
//! interface the network and query layers compile against.
//!
//! ## Schema
//!
//! One table, one uniqueness constraint: `(subj, pred, obj)` is a triple's
//! identity, matching spec §3. Schema version is stored in
//! `PRAGMA user_version`.

pub mod migrations;
pub mod schema;
pub mod triples;

use rusqlite::Connection;
use std::path::Path;

pub use triples::{SqliteStore, TripleStore};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from the local triple store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Open or create the triple store database at `path`.
///
/// Configures WAL mode and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing, and for nodes run with no
/// `--disk` flag per spec §6).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}
