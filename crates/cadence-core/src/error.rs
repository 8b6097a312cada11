use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, CoreError>;
