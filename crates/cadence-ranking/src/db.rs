use rusqlite::Connection;

use crate::error::Result;
use crate::jobs::RANK_JOBS;

/// Initialise the ranking schema in `conn`.
///
/// One score table per rank job, each indexed on `(score, account)`, the
/// order the scan walks. `rank_scans` tracks the scan in progress per job.
pub fn init_db(conn: &Connection) -> Result<()> {
    for job in RANK_JOBS {
        create_score_table(conn, job.table)?;
    }
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS rank_scans (
            job         TEXT    NOT NULL PRIMARY KEY,
            status      TEXT    NOT NULL,   -- 'scanning' | 'done'
            next_chunk  INTEGER NOT NULL DEFAULT 0,
            chunk_size  INTEGER NOT NULL DEFAULT 0,
            next_score  INTEGER,            -- start key of the next chunk
            next_account TEXT,
            started_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        ) STRICT;",
    )?;
    Ok(())
}

/// `table` comes from the static job list, never from user input.
fn create_score_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            account     TEXT    NOT NULL PRIMARY KEY,
            score       INTEGER NOT NULL,
            rank        INTEGER NOT NULL DEFAULT 0
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_{table}_score ON {table} (score, account);"
    ))?;
    Ok(())
}
