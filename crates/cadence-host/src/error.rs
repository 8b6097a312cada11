use cadence_core::Name;
use thiserror::Error;

/// Errors raised by the host or carried across it from a contract.
#[derive(Debug, Error)]
pub enum HostError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No contract named {target}")]
    UnknownContract { target: Name },

    #[error("Contract {target} has no action {action}")]
    UnknownAction { target: Name, action: Name },

    /// The host allows one pending deferred call per owner.
    #[error("A deferred call is already pending for {owner}")]
    CallAlreadyPending { owner: Name },

    #[error("Missing authority of {required} (caller: {caller})")]
    MissingAuthority { required: Name, caller: Name },

    #[error("Inline call depth exceeded ({depth})")]
    InlineDepthExceeded { depth: usize },

    /// An action failed inside a contract.
    #[error("{contract}::{action} failed: {source}")]
    Contract {
        contract: Name,
        action: Name,
        /// When set, the host drops a failing deferred call instead of re-arming it.
        fatal: bool,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl HostError {
    /// Wrap a contract-level error raised while running `contract::action`.
    pub fn contract<E>(contract: &Name, action: &Name, fatal: bool, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HostError::Contract {
            contract: contract.clone(),
            action: action.clone(),
            fatal,
            source: Box::new(source),
        }
    }

    /// Fatal errors cannot succeed on retry without operator intervention.
    pub fn is_fatal(&self) -> bool {
        match self {
            HostError::Database(_) => false,
            HostError::Contract { fatal, .. } => *fatal,
            HostError::Serialization(_)
            | HostError::UnknownContract { .. }
            | HostError::UnknownAction { .. }
            | HostError::CallAlreadyPending { .. }
            | HostError::MissingAuthority { .. }
            | HostError::InlineDepthExceeded { .. } => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
