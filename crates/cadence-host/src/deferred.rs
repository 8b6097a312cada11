//! The deferred-call facility: "run this call again after N seconds".
//!
//! Each owning identity has at most one pending call. Callers that want to
//! replace their pending call must [`cancel`] before they [`schedule`]; the
//! facility refuses a second call rather than silently overwriting the first.

use cadence_core::Name;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{HostError, Result};
use crate::types::{ActionRequest, DeferredCall, PendingCallHandle};

const CALL_COLUMNS: &str =
    "id, owner, target, action, args, delay_secs, due_at, created_at";

/// Schedule `request` to run no earlier than `now + delay_secs` on behalf of `owner`.
pub fn schedule(
    conn: &Connection,
    owner: &Name,
    request: &ActionRequest,
    delay_secs: u64,
    now: u64,
) -> Result<PendingCallHandle> {
    if pending(conn, owner)?.is_some() {
        return Err(HostError::CallAlreadyPending {
            owner: owner.clone(),
        });
    }

    let id = Uuid::new_v4().to_string();
    let due_at = now.saturating_add(delay_secs);
    let args = serde_json::to_string(&request.args)?;

    conn.execute(
        "INSERT INTO deferred_calls
         (id, owner, target, action, args, delay_secs, due_at, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            id,
            owner.as_str(),
            request.target.as_str(),
            request.action.as_str(),
            args,
            delay_secs as i64,
            due_at as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;

    debug!(call_id = %id, %owner, target = %request.target, action = %request.action, due_at, "deferred call scheduled");

    Ok(PendingCallHandle {
        id,
        owner: owner.clone(),
        due_at,
    })
}

/// Cancel the pending call of `owner`, if any. Idempotent.
pub fn cancel(conn: &Connection, owner: &Name) -> Result<Option<PendingCallHandle>> {
    let Some(handle) = pending(conn, owner)? else {
        return Ok(None);
    };
    conn.execute("DELETE FROM deferred_calls WHERE id = ?1", [&handle.id])?;
    info!(call_id = %handle.id, %owner, "deferred call cancelled");
    Ok(Some(handle))
}

/// Handle of the pending call of `owner`, if any.
pub fn pending(conn: &Connection, owner: &Name) -> Result<Option<PendingCallHandle>> {
    Ok(get_by_owner(conn, owner)?.map(|call| call.handle()))
}

pub fn get_by_owner(conn: &Connection, owner: &Name) -> Result<Option<DeferredCall>> {
    let call = conn
        .query_row(
            &format!("SELECT {CALL_COLUMNS} FROM deferred_calls WHERE owner = ?1"),
            [owner.as_str()],
            row_to_call,
        )
        .optional()?;
    Ok(call)
}

/// Oldest call whose due time has arrived.
pub fn next_due(conn: &Connection, now: u64) -> Result<Option<DeferredCall>> {
    let call = conn
        .query_row(
            &format!(
                "SELECT {CALL_COLUMNS} FROM deferred_calls
                 WHERE due_at <= ?1 ORDER BY due_at, created_at, id LIMIT 1"
            ),
            [now as i64],
            row_to_call,
        )
        .optional()?;
    Ok(call)
}

/// All pending calls ordered by due time.
pub fn list(conn: &Connection) -> Result<Vec<DeferredCall>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_COLUMNS} FROM deferred_calls ORDER BY due_at, id"
    ))?;
    let calls = stmt
        .query_map([], row_to_call)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(calls)
}

/// Delete a call by id; used by the host when it consumes a due call.
pub(crate) fn consume(conn: &Connection, id: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM deferred_calls WHERE id = ?1", [id])?;
    Ok(n > 0)
}

/// Push a failed call's due time forward; the host's retry path.
pub(crate) fn rearm(conn: &Connection, id: &str, due_at: u64) -> Result<bool> {
    let n = conn.execute(
        "UPDATE deferred_calls SET due_at = ?1 WHERE id = ?2",
        params![due_at as i64, id],
    )?;
    Ok(n > 0)
}

fn row_to_call(row: &Row<'_>) -> rusqlite::Result<DeferredCall> {
    let args: String = row.get(4)?;
    let args = serde_json::from_str(&args).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DeferredCall {
        id: row.get(0)?,
        owner: name_column(row, 1)?,
        request: ActionRequest {
            target: name_column(row, 2)?,
            action: name_column(row, 3)?,
            args,
        },
        delay_secs: row.get::<_, i64>(5)?.max(0) as u64,
        due_at: row.get::<_, i64>(6)?.max(0) as u64,
        created_at: row.get(7)?,
    })
}

/// Read a TEXT column as a validated [`Name`].
pub fn name_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Name> {
    let raw: String = row.get(idx)?;
    Name::new(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
