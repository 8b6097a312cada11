use cadence_core::Name;
use cadence_host::PendingCallHandle;
use serde::{Deserialize, Serialize};

/// A named periodic job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Primary key.
    pub id: Name,
    /// Action invoked on `target` when the operation is ready.
    pub action: Name,
    pub target: Name,
    /// Seconds between eligible runs; always > 0.
    pub period: u64,
    /// Unix seconds of the last confirmed run. New operations are back-dated
    /// by one period so they become ready at their requested start.
    pub last_run: u64,
    /// Paused operations stay registered but are skipped by the tick.
    pub paused: bool,
    /// Protected operations survive `updateops`; only a full reset removes them.
    pub protected: bool,
}

impl Operation {
    /// Whole periods elapsed since `last_run`; zero if `now` is not past it.
    pub fn periods_elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_run) / self.period.max(1)
    }

    /// Ready iff not paused and at least one full period has elapsed.
    ///
    /// Being several periods overdue still yields a single dispatch per tick.
    pub fn is_ready(&self, now: u64) -> bool {
        !self.paused && self.periods_elapsed(now) >= 1
    }

    /// Earliest instant at which the operation becomes ready, ignoring pause.
    pub fn ready_at(&self) -> u64 {
        self.last_run.saturating_add(self.period)
    }
}

/// Whether the scheduler has a tick waiting in the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    /// No pending self-call; the loop is stopped.
    Idle,
    /// A deferred tick is outstanding.
    Scheduled { next: PendingCallHandle },
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Scheduled { next } => write!(f, "scheduled (due at {})", next.due_at),
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// The self-call this tick scheduled.
    pub next: PendingCallHandle,
    /// The operation dispatched and confirmed, if any was ready.
    pub dispatched: Option<Name>,
}

/// Arguments of the `configure` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureArgs {
    pub id: Name,
    pub action: Name,
    pub target: Name,
    pub period: u64,
    /// Unix seconds; 0 starts now.
    #[serde(default)]
    pub start_time: u64,
}

/// Arguments of `remove` and `confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationIdArgs {
    pub id: Name,
}

/// Arguments of `pause` and `protect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFlagArgs {
    pub id: Name,
    pub flag: bool,
}
