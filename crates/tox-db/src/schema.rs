//! SQL schema for the optional SQLite-backed persistence layer.
//!
//! The core only needs one durable thing: the messaging engine's opaque
//! save/load blob (§6 `MessageStore`). The schema is deliberately a single
//! key-value table rather than a normalized per-message schema, since the
//! savedata format itself is out of scope (§1) — this crate just gives the
//! blob a durable home.

/// Complete schema for schema version 1.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS engine_state (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Key under which the messaging engine's snapshot is stored.
pub const MESSAGING_ENGINE_KEY: &str = "messaging_engine";
