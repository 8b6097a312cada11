use cadence_core::Name;
use cadence_host::HostError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A continuation arrived whose cursor does not fit the running scan.
    #[error("Job state invalid: {0}")]
    JobStateInvalid(String),

    #[error("Unknown rank job: {0}")]
    UnknownJob(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl RankingError {
    /// Convert into a host error for `ranking::action`. Cursor and argument
    /// errors are fatal so a broken chain is dropped rather than retried.
    pub fn into_host(self, contract: &Name, action: &Name) -> HostError {
        match self {
            RankingError::Host(e) => e,
            other => {
                let fatal = !matches!(other, RankingError::Database(_));
                HostError::contract(contract, action, fatal, other)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RankingError>;
