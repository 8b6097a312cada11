use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::Name;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, debug_span};

use crate::deferred;
use crate::error::{HostError, Result};
use crate::settings;
use crate::types::{ActionRequest, PendingCallHandle};

/// Deepest chain of inline calls a single invocation may build.
pub const MAX_INLINE_DEPTH: usize = 8;

/// A ledger-resident contract: a named set of actions.
pub trait Contract: Send + Sync {
    fn name(&self) -> &Name;

    /// Run `action` with JSON `args`. Any error aborts the whole invocation.
    fn apply(&self, cx: &ActionContext<'_>, action: &Name, args: &Value) -> Result<()>;
}

/// Capability to invoke a named action on a named contract.
pub trait Invoker {
    fn call(
        &self,
        conn: &Connection,
        now: u64,
        caller: &Name,
        request: &ActionRequest,
        depth: usize,
    ) -> Result<()>;
}

/// Everything an action may touch while it runs: the invocation's
/// transaction, the current time, who is calling, and the host facilities.
pub struct ActionContext<'a> {
    conn: &'a Connection,
    now: u64,
    receiver: Name,
    caller: Name,
    depth: usize,
    invoker: &'a dyn Invoker,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        conn: &'a Connection,
        now: u64,
        receiver: Name,
        caller: Name,
        depth: usize,
        invoker: &'a dyn Invoker,
    ) -> Self {
        Self {
            conn,
            now,
            receiver,
            caller,
            depth,
            invoker,
        }
    }

    pub fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn caller(&self) -> &Name {
        &self.caller
    }

    /// Succeeds when the caller is `account` or the receiving contract itself.
    pub fn require_auth(&self, account: &Name) -> Result<()> {
        if &self.caller == account || self.caller == self.receiver {
            return Ok(());
        }
        Err(HostError::MissingAuthority {
            required: account.clone(),
            caller: self.caller.clone(),
        })
    }

    /// Like [`require_auth`](Self::require_auth) but any of `accounts` will do.
    pub fn require_any_auth(&self, accounts: &[&Name]) -> Result<()> {
        if self.caller == self.receiver || accounts.iter().any(|a| **a == self.caller) {
            return Ok(());
        }
        Err(HostError::MissingAuthority {
            required: accounts
                .first()
                .map(|a| (*a).clone())
                .unwrap_or_else(|| self.receiver.clone()),
            caller: self.caller.clone(),
        })
    }

    pub fn defer(
        &self,
        owner: &Name,
        request: &ActionRequest,
        delay_secs: u64,
    ) -> Result<PendingCallHandle> {
        deferred::schedule(self.conn, owner, request, delay_secs, self.now)
    }

    pub fn cancel_deferred(&self, owner: &Name) -> Result<Option<PendingCallHandle>> {
        deferred::cancel(self.conn, owner)
    }

    /// Invoke another action inside this invocation, under the receiver's authority.
    pub fn send_inline(&self, request: &ActionRequest) -> Result<()> {
        self.invoker
            .call(self.conn, self.now, &self.receiver, request, self.depth + 1)
    }

    pub fn setting(&self, param: &str) -> Result<Option<u64>> {
        settings::get(self.conn, param)
    }
}

/// Routes action requests to registered contracts by target name.
#[derive(Default, Clone)]
pub struct ContractRouter {
    contracts: HashMap<Name, Arc<dyn Contract>>,
}

impl ContractRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract, replacing any previous contract with the same name.
    pub fn register(&mut self, contract: Arc<dyn Contract>) {
        debug!(contract = %contract.name(), "contract registered");
        self.contracts.insert(contract.name().clone(), contract);
    }
}

impl Invoker for ContractRouter {
    fn call(
        &self,
        conn: &Connection,
        now: u64,
        caller: &Name,
        request: &ActionRequest,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_INLINE_DEPTH {
            return Err(HostError::InlineDepthExceeded { depth });
        }
        let contract = self
            .contracts
            .get(&request.target)
            .ok_or_else(|| HostError::UnknownContract {
                target: request.target.clone(),
            })?;

        let _span = debug_span!(
            "action",
            contract = %request.target,
            action = %request.action,
            %caller,
            depth
        )
        .entered();

        let cx = ActionContext::new(conn, now, request.target.clone(), caller.clone(), depth, self);
        contract.apply(&cx, &request.action, &request.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use cadence_core::name;

    /// Calls itself inline forever.
    struct Recursive {
        name: Name,
    }

    impl Contract for Recursive {
        fn name(&self) -> &Name {
            &self.name
        }

        fn apply(&self, cx: &ActionContext<'_>, action: &Name, _args: &Value) -> Result<()> {
            cx.send_inline(&ActionRequest::new(self.name.clone(), action.clone()))
        }
    }

    struct Guarded {
        name: Name,
        admin: Name,
    }

    impl Contract for Guarded {
        fn name(&self) -> &Name {
            &self.name
        }

        fn apply(&self, cx: &ActionContext<'_>, _action: &Name, _args: &Value) -> Result<()> {
            cx.require_auth(&self.admin)
        }
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn unknown_contract_is_reported() {
        let router = ContractRouter::new();
        let err = router
            .call(
                &conn(),
                0,
                &name!("alice"),
                &ActionRequest::new(name!("nobody"), name!("go")),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownContract { .. }));
    }

    #[test]
    fn inline_recursion_is_bounded() {
        let mut router = ContractRouter::new();
        router.register(Arc::new(Recursive { name: name!("loop") }));
        let err = router
            .call(
                &conn(),
                0,
                &name!("alice"),
                &ActionRequest::new(name!("loop"), name!("go")),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, HostError::InlineDepthExceeded { .. }));
    }

    #[test]
    fn authority_follows_caller() {
        let mut router = ContractRouter::new();
        router.register(Arc::new(Guarded {
            name: name!("vault"),
            admin: name!("admin"),
        }));
        let conn = conn();
        let request = ActionRequest::new(name!("vault"), name!("open"));

        assert!(router.call(&conn, 0, &name!("admin"), &request, 0).is_ok());
        assert!(router.call(&conn, 0, &name!("vault"), &request, 0).is_ok());
        let err = router.call(&conn, 0, &name!("mallory"), &request, 0).unwrap_err();
        assert!(matches!(err, HostError::MissingAuthority { .. }));
    }
}
