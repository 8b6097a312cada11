//! Shared numeric parameters, the equivalent of the ledger's settings contract.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

pub fn get(conn: &Connection, param: &str) -> Result<Option<u64>> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE param = ?1",
            [param],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(value.map(|v| v.max(0) as u64))
}

pub fn set(conn: &Connection, param: &str, value: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (param, value) VALUES (?1, ?2)
         ON CONFLICT(param) DO UPDATE SET value = excluded.value",
        params![param, value as i64],
    )?;
    info!(param, value, "setting updated");
    Ok(())
}

/// Returns whether a row was deleted.
pub fn unset(conn: &Connection, param: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM settings WHERE param = ?1", [param])?;
    Ok(n > 0)
}
