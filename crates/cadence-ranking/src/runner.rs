use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use cadence_host::deferred::name_column;

use crate::error::{RankingError, Result};
use crate::jobs::RankJob;
use crate::types::{percentile, ChunkCursor, ChunkReport, RankKey};

/// A collection that can be walked in bounded windows.
///
/// Keys must be totally ordered and unique; the window starting at `from`
/// includes `from` itself.
pub trait ChunkedJob {
    type Key: Clone;

    /// Current collection size, used as the percentile denominator.
    fn total(&self, conn: &Connection) -> Result<u64>;

    /// Up to `limit` keys in ascending order, starting at `from` inclusive.
    fn window(&self, conn: &Connection, from: Option<&Self::Key>, limit: u64)
        -> Result<Vec<Self::Key>>;

    /// Handle one entry at 1-based `position` of `total`.
    fn process(&self, conn: &Connection, key: &Self::Key, position: u64, total: u64)
        -> Result<()>;
}

/// Drives one chunk of a [`ChunkedJob`] per call.
pub struct ChunkedJobRunner;

impl ChunkedJobRunner {
    /// Process at most `cursor.chunk_size` entries starting at the cursor.
    ///
    /// One extra key is fetched to learn where the next chunk starts; it is
    /// not processed here. When the collection is exhausted the report has
    /// no next cursor.
    pub fn run_chunk<J: ChunkedJob>(
        job: &J,
        conn: &Connection,
        cursor: &ChunkCursor<J::Key>,
    ) -> Result<ChunkReport<J::Key>> {
        if cursor.chunk_size == 0 {
            return Err(RankingError::JobStateInvalid(
                "chunk size must be greater than zero".into(),
            ));
        }
        let base = cursor
            .chunk_index
            .checked_mul(cursor.chunk_size)
            .ok_or_else(|| RankingError::JobStateInvalid("chunk index overflow".into()))?;

        let total = job.total(conn)?;
        let limit = cursor.chunk_size.saturating_add(1);
        let mut keys = job.window(conn, cursor.start_key.as_ref(), limit)?;
        let next_start = if keys.len() as u64 > cursor.chunk_size {
            keys.pop()
        } else {
            None
        };

        for (offset, key) in keys.iter().enumerate() {
            job.process(conn, key, base + offset as u64 + 1, total)?;
        }

        let processed = keys.len() as u64;
        debug!(
            chunk_index = cursor.chunk_index,
            processed,
            total,
            more = next_start.is_some(),
            "chunk processed"
        );

        Ok(ChunkReport {
            chunk_index: cursor.chunk_index,
            processed,
            total,
            next: next_start.map(|key| ChunkCursor {
                start_key: Some(key),
                chunk_index: cursor.chunk_index + 1,
                chunk_size: cursor.chunk_size,
            }),
        })
    }
}

/// Writes percentile ranks into a job's score table.
pub struct TableRank {
    job: &'static RankJob,
}

impl TableRank {
    pub fn new(job: &'static RankJob) -> Self {
        Self { job }
    }
}

impl ChunkedJob for TableRank {
    type Key = RankKey;

    fn total(&self, conn: &Connection) -> Result<u64> {
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.job.table),
            [],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    fn window(&self, conn: &Connection, from: Option<&RankKey>, limit: u64) -> Result<Vec<RankKey>> {
        let table = self.job.table;
        let limit = limit.min(i64::MAX as u64) as i64;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RankKey> {
            Ok(RankKey {
                score: row.get(0)?,
                account: name_column(row, 1)?,
            })
        };
        let keys = match from {
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT score, account FROM {table}
                     ORDER BY score, account LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], map)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some(key) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT score, account FROM {table}
                     WHERE (score, account) >= (?1, ?2)
                     ORDER BY score, account LIMIT ?3"
                ))?;
                let rows = stmt.query_map(params![key.score, key.account.as_str(), limit], map)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(keys)
    }

    fn process(&self, conn: &Connection, key: &RankKey, position: u64, total: u64) -> Result<()> {
        let rank = percentile(position, total) as i64;
        conn.execute(
            &format!("UPDATE {} SET rank = ?1 WHERE account = ?2", self.job.table),
            params![rank, key.account.as_str()],
        )?;
        Ok(())
    }
}

/// Current rank of `account`, if it has a row.
pub(crate) fn rank_of(conn: &Connection, job: &RankJob, account: &str) -> Result<Option<u64>> {
    let rank: Option<i64> = conn
        .query_row(
            &format!("SELECT rank FROM {} WHERE account = ?1", job.table),
            params![account],
            |r| r.get(0),
        )
        .optional()?;
    Ok(rank.map(|r| r.max(0) as u64))
}
