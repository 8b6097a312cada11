use cadence_core::{config::OperationSeed, Name};
use cadence_host::deferred::name_column;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::{
    error::{Result, SchedulerError},
    types::Operation,
};

const OP_COLUMNS: &str = "id, action, target, period, last_run, paused, protected";

/// The persisted table of named periodic operations.
///
/// Borrows a connection (usually the invocation's transaction) so every
/// mutation commits or rolls back with the invocation that made it.
pub struct OperationRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> OperationRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert or update an operation.
    ///
    /// `start_time` is a unix second in the future, or 0 for "now". A new
    /// operation gets `last_run = start - period` so its first readiness
    /// check succeeds at `start`. An existing operation has its action,
    /// target and period replaced and is unpaused; its timing is untouched.
    pub fn configure(
        &self,
        id: &Name,
        action: &Name,
        target: &Name,
        period: u64,
        start_time: u64,
        now: u64,
    ) -> Result<Operation> {
        if period == 0 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "period of {id} must be greater than zero"
            )));
        }
        if start_time != 0 && start_time < now {
            return Err(SchedulerError::InvalidSchedule(format!(
                "start time {start_time} is in the past (now {now}); use 0 to start now"
            )));
        }
        let start = if start_time == 0 { now } else { start_time };
        let period_sql = to_sql_secs("period", period)?;
        let start_sql = to_sql_secs("start time", start)?;

        if self.get(id)?.is_some() {
            self.conn.execute(
                "UPDATE operations SET action = ?1, target = ?2, period = ?3, paused = 0
                 WHERE id = ?4",
                params![action.as_str(), target.as_str(), period_sql, id.as_str()],
            )?;
            info!(op_id = %id, %action, %target, period, "operation reconfigured");
        } else {
            let last_run = start_sql.saturating_sub(period_sql).max(0);
            self.conn.execute(
                "INSERT INTO operations (id, action, target, period, last_run, paused, protected)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                params![
                    id.as_str(),
                    action.as_str(),
                    target.as_str(),
                    period_sql,
                    last_run
                ],
            )?;
            info!(op_id = %id, %action, %target, period, start, "operation created");
        }

        self.require(id)
    }

    pub fn pause(&self, id: &Name, paused: bool) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE operations SET paused = ?1 WHERE id = ?2",
            params![paused, id.as_str()],
        )?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.clone() });
        }
        info!(op_id = %id, paused, "operation pause flag set");
        Ok(())
    }

    pub fn protect(&self, id: &Name, protected: bool) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE operations SET protected = ?1 WHERE id = ?2",
            params![protected, id.as_str()],
        )?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.clone() });
        }
        info!(op_id = %id, protected, "operation protection set");
        Ok(())
    }

    /// Remove an operation by id. Returns `NotFound` if no row is deleted.
    pub fn remove(&self, id: &Name) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM operations WHERE id = ?1", [id.as_str()])?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.clone() });
        }
        info!(op_id = %id, "operation removed");
        Ok(())
    }

    /// Record a run at `now`. Only the timestamp changes, and never backwards.
    pub fn confirm(&self, id: &Name, now: u64) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE operations SET last_run = MAX(last_run, ?1) WHERE id = ?2",
            params![to_sql_secs("confirmation time", now)?, id.as_str()],
        )?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.clone() });
        }
        debug!(op_id = %id, now, "operation confirmed");
        Ok(())
    }

    pub fn get(&self, id: &Name) -> Result<Option<Operation>> {
        let op = self
            .conn
            .query_row(
                &format!("SELECT {OP_COLUMNS} FROM operations WHERE id = ?1"),
                [id.as_str()],
                row_to_operation,
            )
            .optional()?;
        Ok(op)
    }

    fn require(&self, id: &Name) -> Result<Operation> {
        self.get(id)?
            .ok_or_else(|| SchedulerError::NotFound { id: id.clone() })
    }

    /// All operations, least recently run first; ties broken by id.
    pub fn list(&self) -> Result<Vec<Operation>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {OP_COLUMNS} FROM operations ORDER BY last_run, id"
        ))?;
        let ops = stmt
            .query_map([], row_to_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    /// First operation in oldest-run-first order that is ready at `now`.
    pub fn next_ready(&self, now: u64) -> Result<Option<Operation>> {
        Ok(self.list()?.into_iter().find(|op| op.is_ready(now)))
    }

    /// Delete operations; protected ones survive unless `include_protected`.
    pub fn clear(&self, include_protected: bool) -> Result<usize> {
        let n = if include_protected {
            self.conn.execute("DELETE FROM operations", [])?
        } else {
            self.conn
                .execute("DELETE FROM operations WHERE protected = 0", [])?
        };
        info!(removed = n, include_protected, "operations cleared");
        Ok(n)
    }

    /// Insert every seed whose id is not registered yet, back-dated so it is
    /// ready immediately. Existing rows are left alone.
    pub fn seed(&self, seeds: &[OperationSeed], now: u64) -> Result<usize> {
        let mut inserted = 0;
        for seed in seeds {
            if self.get(&seed.id)?.is_some() {
                debug!(op_id = %seed.id, "seed skipped: operation exists");
                continue;
            }
            self.configure(&seed.id, &seed.action, &seed.target, seed.period, 0, now)?;
            if seed.protected {
                self.protect(&seed.id, true)?;
            }
            inserted += 1;
        }
        Ok(inserted)
    }
}

/// SQLite integers are signed; larger values would wrap on the way in.
fn to_sql_secs(what: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        SchedulerError::InvalidSchedule(format!("{what} {value} is out of range"))
    })
}

fn row_to_operation(row: &Row<'_>) -> rusqlite::Result<Operation> {
    Ok(Operation {
        id: name_column(row, 0)?,
        action: name_column(row, 1)?,
        target: name_column(row, 2)?,
        period: row.get::<_, i64>(3)?.max(1) as u64,
        last_run: row.get::<_, i64>(4)?.max(0) as u64,
        paused: row.get(5)?,
        protected: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use cadence_core::name;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn configure_a(reg: &OperationRegistry<'_>, start: u64, now: u64) -> Result<Operation> {
        reg.configure(&name!("a"), &name!("calcrep"), &name!("harvest"), 60, start, now)
    }

    #[test]
    fn new_operation_is_back_dated_to_requested_start() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let op = configure_a(&reg, 1000, 1000).unwrap();
        assert_eq!(op.last_run, 940);
        assert!(!op.is_ready(999));
        assert!(op.is_ready(1000));
    }

    #[test]
    fn zero_start_means_now() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let op = configure_a(&reg, 0, 5000).unwrap();
        assert_eq!(op.last_run, 4940);
        assert!(op.is_ready(5000));
    }

    #[test]
    fn future_start_becomes_ready_at_start() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let op = configure_a(&reg, 2000, 1000).unwrap();
        assert!(!op.is_ready(1999));
        assert!(op.is_ready(2000));
    }

    #[test]
    fn past_start_is_rejected_without_state_change() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let err = configure_a(&reg, 999, 1000).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn zero_period_is_rejected() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let err = reg
            .configure(&name!("a"), &name!("x"), &name!("y"), 0, 0, 1000)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }

    #[test]
    fn out_of_range_times_are_rejected() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let huge = i64::MAX as u64 + 1;

        let err = reg
            .configure(&name!("a"), &name!("x"), &name!("y"), huge, 0, 1000)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)), "{err}");

        let err = configure_a(&reg, u64::MAX, 1000).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)), "{err}");
        assert!(reg.list().unwrap().is_empty());

        let op = configure_a(&reg, i64::MAX as u64, 1000).unwrap();
        assert_eq!(op.last_run, i64::MAX as u64 - 60);
    }

    #[test]
    fn reconfigure_keeps_timing_and_clears_pause() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        configure_a(&reg, 0, 1000).unwrap();
        reg.confirm(&name!("a"), 1500).unwrap();
        reg.pause(&name!("a"), true).unwrap();

        let op = reg
            .configure(&name!("a"), &name!("calctrx"), &name!("accounts"), 120, 0, 9000)
            .unwrap();
        assert_eq!(op.last_run, 1500);
        assert_eq!(op.action, "calctrx");
        assert_eq!(op.target, "accounts");
        assert_eq!(op.period, 120);
        assert!(!op.paused);
    }

    #[test]
    fn confirm_only_moves_the_timestamp() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        configure_a(&reg, 0, 1000).unwrap();
        reg.pause(&name!("a"), true).unwrap();
        let before = reg.get(&name!("a")).unwrap().unwrap();

        reg.confirm(&name!("a"), 1234).unwrap();
        let after = reg.get(&name!("a")).unwrap().unwrap();
        assert_eq!(after.last_run, 1234);
        assert_eq!(
            Operation {
                last_run: before.last_run,
                ..after
            },
            before
        );
    }

    #[test]
    fn confirm_never_moves_backwards() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        configure_a(&reg, 0, 1000).unwrap();
        reg.confirm(&name!("a"), 2000).unwrap();
        reg.confirm(&name!("a"), 1500).unwrap();
        assert_eq!(reg.get(&name!("a")).unwrap().unwrap().last_run, 2000);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        let id = name!("ghost");
        assert!(matches!(reg.pause(&id, true), Err(SchedulerError::NotFound { .. })));
        assert!(matches!(reg.remove(&id), Err(SchedulerError::NotFound { .. })));
        assert!(matches!(reg.confirm(&id, 1), Err(SchedulerError::NotFound { .. })));
        assert!(matches!(reg.protect(&id, true), Err(SchedulerError::NotFound { .. })));
    }

    #[test]
    fn remove_then_configure_matches_fresh_configure() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        configure_a(&reg, 0, 1000).unwrap();
        reg.confirm(&name!("a"), 1100).unwrap();
        reg.remove(&name!("a")).unwrap();
        let again = configure_a(&reg, 0, 3000).unwrap();

        let fresh_conn = self::conn();
        let fresh = configure_a(&OperationRegistry::new(&fresh_conn), 0, 3000).unwrap();
        assert_eq!(again, fresh);
    }

    #[test]
    fn list_is_oldest_run_first() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        for (id, now) in [("c", 3000), ("a", 1000), ("b", 2000)] {
            reg.configure(&Name::new(id).unwrap(), &name!("x"), &name!("y"), 10, 0, now)
                .unwrap();
        }
        let ids: Vec<String> = reg.list().unwrap().into_iter().map(|o| o.id.into()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn clear_spares_protected_unless_asked() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        configure_a(&reg, 0, 1000).unwrap();
        reg.configure(&name!("exch.period"), &name!("onperiod"), &name!("exchange"), 604_800, 0, 1000)
            .unwrap();
        reg.protect(&name!("exch.period"), true).unwrap();

        assert_eq!(reg.clear(false).unwrap(), 1);
        let left = reg.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "exch.period");

        assert_eq!(reg.clear(true).unwrap(), 1);
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn seed_skips_existing_ids() {
        let conn = conn();
        let reg = OperationRegistry::new(&conn);
        configure_a(&reg, 0, 1000).unwrap();
        reg.confirm(&name!("a"), 1500).unwrap();
        let seeds = vec![
            OperationSeed {
                id: name!("a"),
                action: name!("other"),
                target: name!("other"),
                period: 5,
                protected: false,
            },
            OperationSeed {
                id: name!("tokn.resetw"),
                action: name!("resetweekly"),
                target: name!("token"),
                period: 604_800,
                protected: true,
            },
        ];
        assert_eq!(reg.seed(&seeds, 2000).unwrap(), 1);
        let a = reg.get(&name!("a")).unwrap().unwrap();
        assert_eq!((a.action.as_str(), a.last_run), ("calcrep", 1500));
        let t = reg.get(&name!("tokn.resetw")).unwrap().unwrap();
        assert!(t.protected);
        assert!(t.is_ready(2000));
    }
}
