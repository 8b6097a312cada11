use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Name;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_SELF_CALL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CHUNK_SIZE: u64 = 100;
pub const DEFAULT_CONTINUATION_DELAY_SECS: u64 = 1;
pub const DEFAULT_RANK_PERIOD_SECS: u64 = 60;

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Deferred-call polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Contract name of the scheduler; also the owner of its self-call.
    #[serde(default = "default_scheduler_identity")]
    pub identity: Name,
    /// Account whose signature the administrative actions require.
    #[serde(default = "default_scheduler_identity")]
    pub admin: Name,
    /// Written to the shared settings table at daemon start, overriding any
    /// stored value. When unset the table is left as is, and a missing value
    /// makes every tick fail until `set-interval` writes one.
    #[serde(default)]
    pub self_call_interval_secs: Option<u64>,
    /// Operations installed by `reset` and `updateops`.
    #[serde(default = "default_operation_seeds")]
    pub defaults: Vec<OperationSeed>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            identity: default_scheduler_identity(),
            admin: default_scheduler_identity(),
            self_call_interval_secs: None,
            defaults: default_operation_seeds(),
        }
    }
}

/// One entry of the default operation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSeed {
    pub id: Name,
    pub action: Name,
    pub target: Name,
    pub period: u64,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_ranking_identity")]
    pub identity: Name,
    /// Maximum rows ranked per invocation.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_continuation_delay")]
    pub continuation_delay_secs: u64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            identity: default_ranking_identity(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            continuation_delay_secs: DEFAULT_CONTINUATION_DELAY_SECS,
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_scheduler_identity() -> Name {
    crate::name!("scheduler")
}
fn default_ranking_identity() -> Name {
    crate::name!("ranking")
}
fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}
fn default_continuation_delay() -> u64 {
    DEFAULT_CONTINUATION_DELAY_SECS
}

fn default_operation_seeds() -> Vec<OperationSeed> {
    vec![
        OperationSeed {
            id: crate::name!("rank.rep"),
            action: crate::name!("rankreps"),
            target: default_ranking_identity(),
            period: DEFAULT_RANK_PERIOD_SECS,
            protected: false,
        },
        OperationSeed {
            id: crate::name!("rank.cbs"),
            action: crate::name!("rankcbss"),
            target: default_ranking_identity(),
            period: DEFAULT_RANK_PERIOD_SECS,
            protected: false,
        },
    ]
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Nested keys use a double underscore in the environment, e.g.
    /// `CADENCE_SCHEDULER__SELF_CALL_INTERVAL_SECS=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::extract(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("CADENCE_").split("__")),
        )
    }

    /// Extract from an already-assembled figment; separated out for tests.
    pub fn extract(figment: Figment) -> crate::error::Result<Self> {
        let config: CadenceConfig = figment
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.ranking.chunk_size == 0 {
            return Err(crate::error::CoreError::Config(
                "ranking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.self_call_interval_secs == Some(0) {
            return Err(crate::error::CoreError::Config(
                "scheduler.self_call_interval_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(seed) = self.scheduler.defaults.iter().find(|s| s.period == 0) {
            return Err(crate::error::CoreError::Config(format!(
                "default operation {} has a zero period",
                seed.id
            )));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}
