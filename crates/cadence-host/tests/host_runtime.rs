// Atomicity and retry behaviour of the host runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_core::{name, Name};
use cadence_host::{
    deferred, ActionContext, ActionRequest, Contract, ContractRouter, DeferredOutcome, Host,
    HostError, ManualClock,
};
use rusqlite::Connection;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("boom")]
struct Boom;

/// Writes a row for every action, then succeeds or fails depending on the action.
struct Journal {
    name: Name,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Contract for Journal {
    fn name(&self) -> &Name {
        &self.name
    }

    fn apply(&self, cx: &ActionContext<'_>, action: &Name, _args: &Value) -> cadence_host::Result<()> {
        self.seen.lock().unwrap().push(action.to_string());
        cx.conn()
            .execute("INSERT INTO journal (action, at) VALUES (?1, ?2)", rusqlite::params![action.as_str(), cx.now() as i64])?;
        match action.as_str() {
            "write" => Ok(()),
            "again" => {
                cx.defer(
                    &name!("journal"),
                    &ActionRequest::new(self.name.clone(), name!("write")),
                    10,
                )?;
                Ok(())
            }
            "flaky" => {
                cx.defer(
                    &name!("other"),
                    &ActionRequest::new(self.name.clone(), name!("write")),
                    10,
                )?;
                Err(HostError::contract(&self.name, action, false, Boom))
            }
            "fatal" => Err(HostError::contract(&self.name, action, true, Boom)),
            _ => Err(HostError::UnknownAction {
                target: self.name.clone(),
                action: action.clone(),
            }),
        }
    }
}

fn host(clock: &ManualClock) -> (Host, Arc<Mutex<Vec<String>>>) {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE journal (action TEXT NOT NULL, at INTEGER NOT NULL);")
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut router = ContractRouter::new();
    router.register(Arc::new(Journal {
        name: name!("journal"),
        seen: seen.clone(),
    }));
    let host = Host::new(conn, router, Arc::new(clock.clone())).unwrap();
    (host, seen)
}

fn journal_rows(host: &Host) -> i64 {
    host.conn()
        .query_row("SELECT COUNT(*) FROM journal", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn committed_action_persists() {
    let clock = ManualClock::new(1000);
    let (mut host, _) = host(&clock);
    host.push_action(&name!("alice"), &ActionRequest::new(name!("journal"), name!("write")))
        .unwrap();
    assert_eq!(journal_rows(&host), 1);
}

#[test]
fn failed_action_leaves_no_trace() {
    let clock = ManualClock::new(1000);
    let (mut host, seen) = host(&clock);
    let err = host
        .push_action(&name!("alice"), &ActionRequest::new(name!("journal"), name!("flaky")))
        .unwrap_err();
    assert!(!err.is_fatal());
    // The contract ran, but neither its row nor its deferred call survived.
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(journal_rows(&host), 0);
    assert!(deferred::list(host.conn()).unwrap().is_empty());
}

#[test]
fn due_calls_run_no_earlier_than_their_delay() {
    let clock = ManualClock::new(1000);
    let (mut host, _) = host(&clock);
    host.push_action(&name!("alice"), &ActionRequest::new(name!("journal"), name!("again")))
        .unwrap();

    clock.set(1009);
    assert!(host.run_due().unwrap().is_empty());

    clock.set(1010);
    let outcomes = host.run_due().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], DeferredOutcome::Executed { .. }));
    assert_eq!(journal_rows(&host), 2);
    assert!(deferred::list(host.conn()).unwrap().is_empty());
}

#[test]
fn non_fatal_failure_rearms_the_call() {
    let clock = ManualClock::new(1000);
    let (mut host, _) = host(&clock);
    deferred::schedule(
        host.conn(),
        &name!("journal"),
        &ActionRequest::new(name!("journal"), name!("flaky")),
        30,
        1000,
    )
    .unwrap();

    clock.set(1030);
    let outcomes = host.run_due().unwrap();
    match &outcomes[..] {
        [DeferredOutcome::Rearmed { due_at, .. }] => assert_eq!(*due_at, 1060),
        other => panic!("unexpected outcomes: {other:?}"),
    }
    let pending = deferred::pending(host.conn(), &name!("journal")).unwrap().unwrap();
    assert_eq!(pending.due_at, 1060);
    // The call the failed invocation tried to schedule was rolled back.
    assert!(deferred::pending(host.conn(), &name!("other")).unwrap().is_none());
    assert_eq!(journal_rows(&host), 0);
}

#[test]
fn fatal_failure_drops_the_call() {
    let clock = ManualClock::new(1000);
    let (mut host, _) = host(&clock);
    deferred::schedule(
        host.conn(),
        &name!("journal"),
        &ActionRequest::new(name!("journal"), name!("fatal")),
        5,
        1000,
    )
    .unwrap();

    clock.set(1005);
    let outcomes = host.run_due().unwrap();
    assert!(matches!(outcomes[..], [DeferredOutcome::Dropped { .. }]));
    assert!(deferred::list(host.conn()).unwrap().is_empty());
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let clock = ManualClock::new(1000);
    let (host, seen) = host(&clock);
    deferred::schedule(
        host.conn(),
        &name!("journal"),
        &ActionRequest::new(name!("journal"), name!("write")),
        0,
        1000,
    )
    .unwrap();

    let (tx, rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(host.run(Duration::from_millis(5), rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(seen.lock().unwrap().as_slice(), ["write".to_string()]);
}
