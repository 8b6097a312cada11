use cadence_core::Name;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named action on a named contract, with JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub target: Name,
    pub action: Name,
    #[serde(default)]
    pub args: Value,
}

impl ActionRequest {
    /// Request with an empty argument object.
    pub fn new(target: Name, action: Name) -> Self {
        Self {
            target,
            action,
            args: Value::Object(Default::default()),
        }
    }

    pub fn with_args<T: Serialize>(
        target: Name,
        action: Name,
        args: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            target,
            action,
            args: serde_json::to_value(args)?,
        })
    }
}

/// Proof of a scheduled deferred call; cancelling by owner hands it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCallHandle {
    /// UUID v4 string.
    pub id: String,
    pub owner: Name,
    /// Earliest unix second at which the host may run the call.
    pub due_at: u64,
}

/// A persisted deferred call record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredCall {
    pub id: String,
    /// Identity whose single pending slot this call occupies. The call runs
    /// with this identity as its caller.
    pub owner: Name,
    pub request: ActionRequest,
    pub delay_secs: u64,
    pub due_at: u64,
    /// ISO-8601 timestamp of scheduling.
    pub created_at: String,
}

impl DeferredCall {
    pub fn handle(&self) -> PendingCallHandle {
        PendingCallHandle {
            id: self.id.clone(),
            owner: self.owner.clone(),
            due_at: self.due_at,
        }
    }
}
