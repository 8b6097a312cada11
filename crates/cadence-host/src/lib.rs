//! `cadence-host`: an in-process stand-in for the ledger host that the
//! scheduler and ranking contracts run on.
//!
//! # Overview
//!
//! Every invocation runs inside a single SQLite transaction and either commits
//! completely or leaves no trace. Contracts continue work later through the
//! deferred-call facility: at most one pending call per owning identity,
//! executed no earlier than its delay by [`runtime::Host::run_due`].
//!
//! | Piece                    | Role                                               |
//! |--------------------------|----------------------------------------------------|
//! | [`deferred`]             | schedule / cancel / inspect pending calls          |
//! | [`contract::Invoker`]    | route a named action to a registered contract      |
//! | [`settings`]             | shared numeric parameters read by contracts        |
//! | [`runtime::Host`]        | atomic invocation, deferred execution, async loop  |

pub mod clock;
pub mod contract;
pub mod db;
pub mod deferred;
pub mod error;
pub mod runtime;
pub mod settings;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use contract::{ActionContext, Contract, ContractRouter, Invoker};
pub use error::{HostError, Result};
pub use runtime::{DeferredOutcome, Host};
pub use types::{ActionRequest, DeferredCall, PendingCallHandle};
