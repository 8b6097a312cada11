use cadence_core::Name;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use cadence_host::deferred::name_column;

use crate::error::Result;
use crate::jobs::RankJob;
use crate::runner::rank_of;

/// Score and rank rows of one job's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub account: Name,
    pub score: i64,
    pub rank: u64,
}

/// Read/write access to a job's score table.
pub struct ScoreBook<'c> {
    conn: &'c Connection,
    job: &'static RankJob,
}

impl<'c> ScoreBook<'c> {
    pub fn new(conn: &'c Connection, job: &'static RankJob) -> Self {
        Self { conn, job }
    }

    /// Insert or update a score. The existing rank is kept until the next scan.
    pub fn set_score(&self, account: &Name, score: i64) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (account, score) VALUES (?1, ?2)
                 ON CONFLICT(account) DO UPDATE SET score = excluded.score",
                self.job.table
            ),
            params![account.as_str(), score],
        )?;
        debug!(job = self.job.name, %account, score, "score set");
        Ok(())
    }

    pub fn score(&self, account: &Name) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT score FROM {} WHERE account = ?1", self.job.table),
                params![account.as_str()],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn rank(&self, account: &Name) -> Result<Option<u64>> {
        rank_of(self.conn, self.job, account.as_str())
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.job.table),
            [],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    /// All entries, highest rank first.
    pub fn list(&self) -> Result<Vec<ScoreEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT account, score, rank FROM {}
             ORDER BY rank DESC, score DESC, account",
            self.job.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ScoreEntry {
                account: name_column(row, 0)?,
                score: row.get(1)?,
                rank: row.get::<_, i64>(2)?.max(0) as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::jobs::{COMMUNITY_BUILDING, REPUTATION};
    use cadence_core::name;

    #[test]
    fn set_and_read_back() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let rep = ScoreBook::new(&conn, &REPUTATION);

        rep.set_score(&name!("alice"), 10).unwrap();
        rep.set_score(&name!("alice"), 12).unwrap();
        rep.set_score(&name!("bob"), 3).unwrap();

        assert_eq!(rep.score(&name!("alice")).unwrap(), Some(12));
        assert_eq!(rep.rank(&name!("alice")).unwrap(), Some(0));
        assert_eq!(rep.score(&name!("carol")).unwrap(), None);
        assert_eq!(rep.count().unwrap(), 2);

        // Tables are independent per job.
        assert_eq!(ScoreBook::new(&conn, &COMMUNITY_BUILDING).count().unwrap(), 0);
    }

    #[test]
    fn list_puts_highest_rank_first() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let rep = ScoreBook::new(&conn, &REPUTATION);
        rep.set_score(&name!("alice"), 5).unwrap();
        rep.set_score(&name!("bob"), 9).unwrap();
        rep.set_score(&name!("carol"), 7).unwrap();
        conn.execute("UPDATE reputation SET rank = 5000 WHERE account = 'alice'", [])
            .unwrap();

        let accounts: Vec<String> = rep
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.account.to_string())
            .collect();
        // Unranked rows follow, highest score first.
        assert_eq!(accounts, vec!["alice", "bob", "carol"]);
    }
}
