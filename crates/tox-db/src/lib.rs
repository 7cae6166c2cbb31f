//! Optional SQLite-backed persistence for the messaging engine's
//! `MessageStore` collaborator (§6). Embedding applications that don't
//! need durability can skip this crate entirely and run with no store
//! configured, or supply their own in-memory implementation — `tox-db`
//! is one concrete option, not a requirement.

pub mod migrations;
pub mod queries;
pub mod schema;
mod store;

use std::path::Path;

use rusqlite::Connection;

pub use store::SqliteMessageStore;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at `path`, running any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database, for tests and embedders that want
/// ephemeral storage without a filesystem path.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}
