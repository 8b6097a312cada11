//! `cadence-core`: identifiers, configuration and the shared error type used
//! by every other cadence crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::Name;
