//! `cadence-ranking`: percentile ranks computed by chunked, resumable scans.
//!
//! A full scan of a score table can exceed what one invocation may do, so
//! [`runner::ChunkedJobRunner`] processes a bounded window per invocation and
//! hands back a [`types::ChunkCursor`] for the continuation. The
//! [`contract::RankingContract`] chains those continuations through the
//! host's deferred-call facility until the table is exhausted.

pub mod contract;
pub mod db;
pub mod error;
pub mod jobs;
pub mod runner;
pub mod scan;
pub mod scores;
pub mod types;

pub use contract::RankingContract;
pub use error::{RankingError, Result};
pub use jobs::{RankJob, COMMUNITY_BUILDING, RANK_JOBS, REPUTATION};
pub use runner::{ChunkedJob, ChunkedJobRunner};
pub use types::{ChunkCursor, ChunkReport, RankKey, ScanStatus, StartOutcome};
