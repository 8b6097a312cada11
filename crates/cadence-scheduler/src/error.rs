use cadence_core::Name;
use cadence_host::HostError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested start time or period cannot be scheduled.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No operation with the given id exists in the registry.
    #[error("Operation not found: {id}")]
    NotFound { id: Name },

    /// A required shared setting is absent; the tick cannot reschedule itself.
    #[error("Missing config: the parameter {param} is not configured in settings")]
    MissingConfig { param: &'static str },

    /// The dispatched target action failed.
    #[error("Dispatch of operation {id} failed: {source}")]
    DispatchFailure {
        id: Name,
        #[source]
        source: HostError,
    },

    /// Action arguments did not decode.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),

    /// Host facility error (authority, deferred calls, ...).
    #[error(transparent)]
    Host(#[from] HostError),
}

impl SchedulerError {
    /// Convert into a host error for `scheduler::action`.
    ///
    /// `MissingConfig` is fatal: re-running the tick cannot help until an
    /// operator fixes the settings and restarts the loop.
    pub fn into_host(self, contract: &Name, action: &Name) -> HostError {
        match self {
            SchedulerError::Host(e) => e,
            other => {
                let fatal = matches!(
                    other,
                    SchedulerError::MissingConfig { .. } | SchedulerError::InvalidArgs(_)
                );
                HostError::contract(contract, action, fatal, other)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
