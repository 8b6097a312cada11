use std::sync::Arc;
use std::time::Duration;

use cadence_core::Name;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    clock::Clock,
    contract::{ContractRouter, Invoker},
    db::init_db,
    deferred,
    error::{HostError, Result},
    types::{ActionRequest, DeferredCall},
};

/// Upper bound on deferred calls executed by one [`Host::run_due`] pass.
pub const MAX_DEFERRED_PER_PASS: usize = 64;

/// What happened to a due deferred call.
#[derive(Debug)]
pub enum DeferredOutcome {
    /// Ran and committed.
    Executed { call: DeferredCall },
    /// Failed; all its effects were rolled back and the same call was
    /// re-armed one original delay later.
    Rearmed {
        call: DeferredCall,
        due_at: u64,
        error: HostError,
    },
    /// Failed fatally; rolled back and removed. The owner's chain is broken
    /// until someone schedules it again.
    Dropped { call: DeferredCall, error: HostError },
}

/// The ledger host: owns the database, the registered contracts and the clock.
///
/// Every invocation is one SQLite transaction. Nothing an invocation wrote,
/// including the deferred calls it scheduled, survives a failure.
pub struct Host {
    conn: Connection,
    router: ContractRouter,
    clock: Arc<dyn Clock>,
}

impl Host {
    /// Create a host, initialising the host schema if needed.
    ///
    /// Contract crates initialise their own tables; do that on `conn` first.
    pub fn new(conn: Connection, router: ContractRouter, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn,
            router,
            clock,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Run one action on behalf of `caller` as an atomic invocation.
    pub fn push_action(&mut self, caller: &Name, request: &ActionRequest) -> Result<()> {
        let now = self.clock.now();
        let tx = self.conn.transaction()?;
        // Dropping `tx` on the error path rolls the invocation back.
        self.router.call(&tx, now, caller, request, 0)?;
        tx.commit()?;
        info!(%caller, target = %request.target, action = %request.action, "action committed");
        Ok(())
    }

    /// Execute every deferred call whose due time has arrived, oldest first.
    pub fn run_due(&mut self) -> Result<Vec<DeferredOutcome>> {
        let mut outcomes = Vec::new();
        for _ in 0..MAX_DEFERRED_PER_PASS {
            let now = self.clock.now();
            let Some(call) = deferred::next_due(&self.conn, now)? else {
                break;
            };
            outcomes.push(self.execute_deferred(call, now)?);
        }
        if outcomes.len() == MAX_DEFERRED_PER_PASS {
            warn!(limit = MAX_DEFERRED_PER_PASS, "deferred pass hit its limit; remaining calls wait for the next pass");
        }
        Ok(outcomes)
    }

    /// Main event loop. Polls for due calls until `shutdown` broadcasts `true`.
    pub async fn run(mut self, poll: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(poll_ms = poll.as_millis() as u64, "host loop started");

        let mut interval = tokio::time::interval(poll);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_due() {
                        error!("deferred pass failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("host loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    fn execute_deferred(&mut self, call: DeferredCall, now: u64) -> Result<DeferredOutcome> {
        let result = {
            let tx = self.conn.transaction()?;
            deferred::consume(&tx, &call.id)?;
            match self.router.call(&tx, now, &call.owner, &call.request, 0) {
                Ok(()) => tx.commit().map_err(HostError::from),
                Err(e) => Err(e),
            }
        };

        let error = match result {
            Ok(()) => {
                info!(call_id = %call.id, owner = %call.owner, action = %call.request.action, "deferred call executed");
                return Ok(DeferredOutcome::Executed { call });
            }
            Err(e) => e,
        };

        if error.is_fatal() {
            deferred::consume(&self.conn, &call.id)?;
            error!(call_id = %call.id, owner = %call.owner, action = %call.request.action, "deferred call dropped: {error}");
            return Ok(DeferredOutcome::Dropped { call, error });
        }

        // A zero delay would spin inside a single pass.
        let due_at = now.saturating_add(call.delay_secs.max(1));
        deferred::rearm(&self.conn, &call.id, due_at)?;
        warn!(call_id = %call.id, owner = %call.owner, action = %call.request.action, due_at, "deferred call failed, retrying: {error}");
        Ok(DeferredOutcome::Rearmed {
            call,
            due_at,
            error,
        })
    }
}
