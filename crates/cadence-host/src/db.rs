use rusqlite::Connection;

use crate::error::Result;

/// Initialise the host schema in `conn`.
///
/// Creates the `deferred_calls` and `settings` tables (idempotent). The
/// `owner` column is unique: the facility keeps at most one pending call per
/// owning identity.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS deferred_calls (
            id          TEXT    NOT NULL PRIMARY KEY,
            owner       TEXT    NOT NULL UNIQUE,
            target      TEXT    NOT NULL,
            action      TEXT    NOT NULL,
            args        TEXT    NOT NULL,   -- JSON-encoded call arguments
            delay_secs  INTEGER NOT NULL,
            due_at      INTEGER NOT NULL,   -- unix seconds
            created_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_deferred_calls_due_at ON deferred_calls (due_at);

        CREATE TABLE IF NOT EXISTS settings (
            param       TEXT    NOT NULL PRIMARY KEY,
            value       INTEGER NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}
