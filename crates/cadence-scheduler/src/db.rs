use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `operations` table (idempotent) and an index on
/// `(last_run, id)` so the tick can walk operations oldest-run-first.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS operations (
            id          TEXT    NOT NULL PRIMARY KEY,
            action      TEXT    NOT NULL,
            target      TEXT    NOT NULL,
            period      INTEGER NOT NULL CHECK (period > 0),
            last_run    INTEGER NOT NULL,   -- unix seconds of last confirmed run
            paused      INTEGER NOT NULL DEFAULT 0,
            protected   INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_operations_last_run ON operations (last_run, id);
        ",
    )?;
    Ok(())
}
