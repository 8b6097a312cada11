use std::sync::Arc;

use anyhow::Context;
use cadence_core::{
    config::{CadenceConfig, SchedulerConfig},
    Name,
};
use cadence_host::{settings, ActionRequest, ContractRouter, Host, SystemClock};
use cadence_ranking::RankingContract;
use cadence_scheduler::{SchedulerContract, SELF_CALL_INTERVAL_PARAM};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

/// Open the database, run every schema migration and register the contracts.
pub fn open_host(config: &CadenceConfig) -> anyhow::Result<Host> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {db_path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // idempotent
    cadence_host::db::init_db(&conn)?;
    cadence_scheduler::db::init_db(&conn)?;
    cadence_ranking::db::init_db(&conn)?;

    apply_interval(&conn, &config.scheduler)?;

    let mut router = ContractRouter::new();
    router.register(Arc::new(SchedulerContract::from_config(&config.scheduler)));
    router.register(Arc::new(RankingContract::from_config(config)?));

    Ok(Host::new(conn, router, Arc::new(SystemClock))?)
}

/// Write the configured tick interval. Without one, whatever `set-interval`
/// stored earlier stays in place.
fn apply_interval(conn: &Connection, scheduler: &SchedulerConfig) -> anyhow::Result<()> {
    match scheduler.self_call_interval_secs {
        Some(secs) => settings::set(conn, SELF_CALL_INTERVAL_PARAM, secs)?,
        None if settings::get(conn, SELF_CALL_INTERVAL_PARAM)?.is_none() => {
            warn!(
                param = SELF_CALL_INTERVAL_PARAM,
                "no tick interval stored; ticks fail until `cadence set-interval` runs"
            );
        }
        None => {}
    }
    Ok(())
}

/// Push `target::action` signed by `caller`, committing on success.
pub fn push<A: Serialize>(
    host: &mut Host,
    caller: &Name,
    target: &Name,
    action: &str,
    args: &A,
) -> anyhow::Result<()> {
    let request = ActionRequest::with_args(target.clone(), Name::new(action)?, args)?;
    host.push_action(caller, &request)
        .with_context(|| format!("{target}::{action} rejected"))?;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(path: &std::path::Path, interval: Option<u64>) -> CadenceConfig {
        let mut config = CadenceConfig::default();
        config.database.path = path.to_string_lossy().into_owned();
        config.scheduler.self_call_interval_secs = interval;
        config
    }

    fn stored_interval(host: &Host) -> Option<u64> {
        settings::get(host.conn(), SELF_CALL_INTERVAL_PARAM).unwrap()
    }

    #[test]
    fn stored_interval_survives_restart_without_config() {
        let path = std::env::temp_dir().join(format!("cadence-app-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let host = open_host(&config_at(&path, None)).unwrap();
            assert_eq!(stored_interval(&host), None);
            settings::set(host.conn(), SELF_CALL_INTERVAL_PARAM, 10).unwrap();
        }
        {
            let host = open_host(&config_at(&path, None)).unwrap();
            assert_eq!(stored_interval(&host), Some(10));
        }
        {
            let host = open_host(&config_at(&path, Some(45))).unwrap();
            assert_eq!(stored_interval(&host), Some(45));
        }

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[test]
    fn configured_interval_overrides_stored_value() {
        let conn = Connection::open_in_memory().unwrap();
        cadence_host::db::init_db(&conn).unwrap();
        settings::set(&conn, SELF_CALL_INTERVAL_PARAM, 10).unwrap();

        let mut scheduler = SchedulerConfig::default();
        apply_interval(&conn, &scheduler).unwrap();
        assert_eq!(settings::get(&conn, SELF_CALL_INTERVAL_PARAM).unwrap(), Some(10));

        scheduler.self_call_interval_secs = Some(20);
        apply_interval(&conn, &scheduler).unwrap();
        assert_eq!(settings::get(&conn, SELF_CALL_INTERVAL_PARAM).unwrap(), Some(20));
    }
}
