//! `cadence-scheduler`: recurring operations driven by a self-rescheduling tick.
//!
//! # Overview
//!
//! Operations are persisted to a SQLite `operations` table. The scheduler
//! contract never loops: each `tick` cancels its own pending deferred call,
//! schedules the next tick after the configured interval, and dispatches at
//! most one ready operation, the one that ran least recently.
//!
//! # Lifecycle
//!
//! | State       | Meaning                                               |
//! |-------------|-------------------------------------------------------|
//! | `Idle`      | No pending self-call; nothing happens until `start`   |
//! | `Scheduled` | A deferred `tick` is waiting in the host              |
//! | `Running`   | A tick is executing (exists only inside an invocation)|
//!
//! An operation is ready once a full `period` has elapsed since `last_run`.
//! Dispatch and confirmation happen in the same invocation, so a failing
//! target undoes both along with the freshly scheduled tick.

pub mod db;
pub mod engine;
pub mod error;
pub mod registry;
pub mod types;

pub use engine::{SchedulerContract, SELF_CALL_INTERVAL_PARAM};
pub use error::{Result, SchedulerError};
pub use registry::OperationRegistry;
pub use types::{Operation, SchedulerState, TickOutcome};
