//! Per-job scan progress in `rank_scans`.

use cadence_core::Name;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{RankingError, Result};
use crate::jobs::RankJob;
use crate::types::{ChunkCursor, RankKey, RankScan};

pub fn get(conn: &Connection, job: &RankJob) -> Result<Option<RankScan>> {
    let row = conn
        .query_row(
            "SELECT job, status, next_chunk, chunk_size, next_score, next_account,
                    started_at, updated_at
             FROM rank_scans WHERE job = ?1",
            params![job.name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        )
        .optional()?;

    row.map(
        |(job, status, next_chunk, chunk_size, next_score, next_account, started_at, updated_at)|
         -> Result<RankScan> {
            let next_key = match (next_score, next_account) {
                (Some(score), Some(account)) => Some(RankKey {
                    score,
                    account: Name::new(account)
                        .map_err(|e| RankingError::JobStateInvalid(e.to_string()))?,
                }),
                (None, None) => None,
                _ => {
                    return Err(RankingError::JobStateInvalid(format!(
                        "half-written start key for {job}"
                    )))
                }
            };
            Ok(RankScan {
                job,
                status: status.parse().map_err(RankingError::JobStateInvalid)?,
                next_chunk: next_chunk.max(0) as u64,
                chunk_size: chunk_size.max(0) as u64,
                next_key,
                started_at: started_at.max(0) as u64,
                updated_at: updated_at.max(0) as u64,
            })
        },
    )
    .transpose()
}

pub fn is_scanning(conn: &Connection, job: &RankJob) -> Result<bool> {
    Ok(get(conn, job)?.is_some_and(|s| s.status.is_scanning()))
}

/// Mark a new scan as running from chunk 0 with `chunk_size` entries per
/// chunk.
pub fn begin(conn: &Connection, job: &RankJob, chunk_size: u64, now: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO rank_scans
            (job, status, next_chunk, chunk_size, next_score, next_account,
             started_at, updated_at)
         VALUES (?1, 'scanning', 0, ?2, NULL, NULL, ?3, ?3)
         ON CONFLICT(job) DO UPDATE SET
            status = 'scanning', next_chunk = 0, chunk_size = excluded.chunk_size,
            next_score = NULL, next_account = NULL,
            started_at = excluded.started_at, updated_at = excluded.updated_at",
        params![job.name, chunk_size as i64, now as i64],
    )?;
    Ok(())
}

/// Record the continuation just issued; only a cursor equal to `next` is
/// accepted afterwards.
pub fn advance(conn: &Connection, job: &RankJob, next: &ChunkCursor, now: u64) -> Result<()> {
    let (score, account) = match &next.start_key {
        Some(key) => (Some(key.score), Some(key.account.as_str())),
        None => (None, None),
    };
    conn.execute(
        "UPDATE rank_scans
         SET next_chunk = ?2, next_score = ?3, next_account = ?4, updated_at = ?5
         WHERE job = ?1",
        params![job.name, next.chunk_index as i64, score, account, now as i64],
    )?;
    Ok(())
}

pub fn finish(conn: &Connection, job: &RankJob, now: u64) -> Result<()> {
    conn.execute(
        "UPDATE rank_scans SET status = 'done', updated_at = ?2 WHERE job = ?1",
        params![job.name, now as i64],
    )?;
    Ok(())
}

/// Forget the job's scan entirely. Returns whether a row existed.
pub fn clear(conn: &Connection, job: &RankJob) -> Result<bool> {
    let n = conn.execute("DELETE FROM rank_scans WHERE job = ?1", params![job.name])?;
    Ok(n > 0)
}
