//! Key-value accessors for the `engine_state` table.

use rusqlite::Connection;

use crate::{DbError, Result};

/// Fetch a stored blob by key, or `None` if never saved.
pub fn get(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>> {
    let result = conn.query_row(
        "SELECT value FROM engine_state WHERE key = ?1",
        [key],
        |row| row.get::<_, Vec<u8>>(0),
    );

    match result {
        Ok(bytes) => Ok(Some(bytes)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::Sqlite(e)),
    }
}

/// Upsert a blob under `key`, stamped with `updated_at` (unix seconds).
pub fn set(conn: &Connection, key: &str, value: &[u8], updated_at: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO engine_state (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value, updated_at as i64],
    )?;
    Ok(())
}
