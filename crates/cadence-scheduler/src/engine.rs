use cadence_core::{config::OperationSeed, config::SchedulerConfig, name, Name};
use cadence_host::{
    deferred, ActionContext, ActionRequest, Contract, HostError, PendingCallHandle,
};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::{
    error::{Result, SchedulerError},
    registry::OperationRegistry,
    types::{
        ConfigureArgs, OperationFlagArgs, OperationIdArgs, SchedulerState, TickOutcome,
    },
};

/// Settings parameter holding the seconds between ticks.
pub const SELF_CALL_INTERVAL_PARAM: &str = "scheduler.interval";

/// The scheduler contract.
///
/// Owns the operation registry and the self-rescheduling tick. Its own
/// name doubles as the owner of its single deferred self-call.
pub struct SchedulerContract {
    identity: Name,
    admin: Name,
    defaults: Vec<OperationSeed>,
}

impl SchedulerContract {
    pub fn new(identity: Name, admin: Name, defaults: Vec<OperationSeed>) -> Self {
        Self {
            identity,
            admin,
            defaults,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.identity.clone(),
            config.admin.clone(),
            config.defaults.clone(),
        )
    }

    pub fn identity(&self) -> &Name {
        &self.identity
    }

    /// Idle or Scheduled, read from the host's deferred-call bookkeeping.
    pub fn state(conn: &Connection, identity: &Name) -> Result<SchedulerState> {
        Ok(match deferred::pending(conn, identity)? {
            Some(next) => SchedulerState::Scheduled { next },
            None => SchedulerState::Idle,
        })
    }

    /// One iteration of the loop.
    ///
    /// Replaces the pending self-call with a fresh one, then dispatches and
    /// confirms at most one ready operation: the least recently run.
    pub fn tick(&self, cx: &ActionContext<'_>) -> Result<TickOutcome> {
        let now = cx.now();
        let _span = info_span!("tick", scheduler = %self.identity, now).entered();
        debug!("scheduler running");

        let next = self.reschedule(cx)?;

        let registry = OperationRegistry::new(cx.conn());
        let Some(op) = registry.next_ready(now)? else {
            debug!(next_tick = next.due_at, "no operation ready");
            return Ok(TickOutcome {
                next,
                dispatched: None,
            });
        };

        info!(
            op_id = %op.id,
            target = %op.target,
            action = %op.action,
            periods_elapsed = op.periods_elapsed(now),
            "dispatching operation"
        );
        cx.send_inline(&ActionRequest::new(op.target.clone(), op.action.clone()))
            .map_err(|source| SchedulerError::DispatchFailure {
                id: op.id.clone(),
                source,
            })?;
        registry.confirm(&op.id, now)?;

        Ok(TickOutcome {
            next,
            dispatched: Some(op.id),
        })
    }

    /// Idle -> Scheduled: replace any pending self-call with a new one.
    pub fn start(&self, cx: &ActionContext<'_>) -> Result<PendingCallHandle> {
        cx.require_auth(&self.admin)?;
        let next = self.reschedule(cx)?;
        info!(scheduler = %self.identity, due_at = next.due_at, "scheduler started");
        Ok(next)
    }

    /// Scheduled -> Idle. Confirmations already committed stay as they are.
    pub fn cancel(&self, cx: &ActionContext<'_>) -> Result<Option<PendingCallHandle>> {
        cx.require_auth(&self.admin)?;
        let cancelled = cx.cancel_deferred(&self.identity)?;
        if cancelled.is_none() {
            debug!(scheduler = %self.identity, "cancel: no pending self-call");
        }
        Ok(cancelled)
    }

    /// Full reset: stop the loop, drop every operation (protected included)
    /// and install the default set. Returns the number of seeded operations.
    pub fn reset(&self, cx: &ActionContext<'_>) -> Result<usize> {
        cx.require_auth(&self.admin)?;
        cx.cancel_deferred(&self.identity)?;
        let registry = OperationRegistry::new(cx.conn());
        registry.clear(true)?;
        let seeded = registry.seed(&self.defaults, cx.now())?;
        warn!(scheduler = %self.identity, seeded, "scheduler reset");
        Ok(seeded)
    }

    /// Routine re-seed: drop unprotected operations and add missing defaults.
    pub fn update_ops(&self, cx: &ActionContext<'_>) -> Result<usize> {
        cx.require_auth(&self.admin)?;
        let registry = OperationRegistry::new(cx.conn());
        registry.clear(false)?;
        let seeded = registry.seed(&self.defaults, cx.now())?;
        info!(scheduler = %self.identity, seeded, "default operations updated");
        Ok(seeded)
    }

    fn reschedule(&self, cx: &ActionContext<'_>) -> Result<PendingCallHandle> {
        cx.cancel_deferred(&self.identity)?;
        let interval = cx
            .setting(SELF_CALL_INTERVAL_PARAM)?
            .ok_or(SchedulerError::MissingConfig {
                param: SELF_CALL_INTERVAL_PARAM,
            })?;
        let next = cx.defer(
            &self.identity,
            &ActionRequest::new(self.identity.clone(), name!("tick")),
            interval,
        )?;
        Ok(next)
    }

    fn handle(&self, cx: &ActionContext<'_>, action: &Name, args: &Value) -> Result<()> {
        match action.as_str() {
            "tick" => {
                self.tick(cx)?;
            }
            "configure" => {
                cx.require_auth(&self.admin)?;
                let a: ConfigureArgs = decode(args)?;
                OperationRegistry::new(cx.conn()).configure(
                    &a.id,
                    &a.action,
                    &a.target,
                    a.period,
                    a.start_time,
                    cx.now(),
                )?;
            }
            "pause" => {
                cx.require_auth(&self.admin)?;
                let a: OperationFlagArgs = decode(args)?;
                OperationRegistry::new(cx.conn()).pause(&a.id, a.flag)?;
            }
            "protect" => {
                cx.require_auth(&self.admin)?;
                let a: OperationFlagArgs = decode(args)?;
                OperationRegistry::new(cx.conn()).protect(&a.id, a.flag)?;
            }
            "remove" => {
                cx.require_auth(&self.admin)?;
                let a: OperationIdArgs = decode(args)?;
                OperationRegistry::new(cx.conn()).remove(&a.id)?;
            }
            "confirm" => {
                cx.require_auth(&self.admin)?;
                let a: OperationIdArgs = decode(args)?;
                OperationRegistry::new(cx.conn()).confirm(&a.id, cx.now())?;
            }
            "start" => {
                self.start(cx)?;
            }
            "cancel" => {
                self.cancel(cx)?;
            }
            "reset" => {
                self.reset(cx)?;
            }
            "updateops" => {
                self.update_ops(cx)?;
            }
            _ => {
                return Err(HostError::UnknownAction {
                    target: self.identity.clone(),
                    action: action.clone(),
                }
                .into())
            }
        }
        Ok(())
    }
}

impl Contract for SchedulerContract {
    fn name(&self) -> &Name {
        &self.identity
    }

    fn apply(&self, cx: &ActionContext<'_>, action: &Name, args: &Value) -> cadence_host::Result<()> {
        self.handle(cx, action, args)
            .map_err(|e| e.into_host(&self.identity, action))
    }
}

fn decode<T: DeserializeOwned>(args: &Value) -> Result<T> {
    Ok(T::deserialize(args)?)
}
