//! SQLite-backed implementation of `tox_types::traits::MessageStore`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tox_types::error::{Result, TypesError};
use tox_types::traits::MessageStore;

use crate::{schema, DbError};

impl From<DbError> for TypesError {
    fn from(e: DbError) -> Self {
        TypesError::storage(e.to_string())
    }
}

/// A `MessageStore` backed by a single-row blob in an `engine_state` table.
/// The connection is guarded by a mutex since `rusqlite::Connection` is
/// `Send` but not `Sync`, and the trait requires both.
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
}

impl SqliteMessageStore {
    pub fn open(path: &Path) -> std::result::Result<Self, DbError> {
        Ok(Self {
            conn: Mutex::new(crate::open(path)?),
        })
    }

    pub fn open_memory() -> std::result::Result<Self, DbError> {
        Ok(Self {
            conn: Mutex::new(crate::open_memory()?),
        })
    }
}

impl MessageStore for SqliteMessageStore {
    fn save(&self, bytes: &[u8]) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        crate::queries::engine_state::set(&conn, schema::MESSAGING_ENGINE_KEY, bytes, now)
            .map_err(TypesError::from)
    }

    fn load(&self) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        crate::queries::engine_state::get(&conn, schema::MESSAGING_ENGINE_KEY).map_err(TypesError::from)
    }
}
