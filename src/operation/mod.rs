//! Operation snapshots as reported by the control plane, and the tables used
//! to classify their status strings.

mod name;

pub use name::OperationName;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::waiter::WaiterError;

pub const STATUS_UNSPECIFIED: &str = "STATUS_UNSPECIFIED";
pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_RUNNING: &str = "RUNNING";
pub const STATUS_DONE: &str = "DONE";
pub const STATUS_ABORTING: &str = "ABORTING";

/// A point-in-time view of a server-side operation.
///
/// Implementors only project the fields the waiter needs. The default
/// [`error_from_snapshot`](OperationSnapshot::error_from_snapshot) follows the
/// container API convention: there is no structured error field, so a
/// non-empty status message on a snapshot outside the pending set is the
/// failure signal.
pub trait OperationSnapshot: Clone + std::fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &str;

    fn status(&self) -> &str;

    fn status_message(&self) -> Option<&str>;

    /// Business error carried by this snapshot, if any.
    ///
    /// Always `None` while the status is pending, even when a message is
    /// already present.
    fn error_from_snapshot(&self, states: &StateTable) -> Option<String> {
        if states.is_pending(self.status()) {
            return None;
        }
        self.status_message()
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    }
}

/// Where a status string falls in a [`StateTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Pending,
    Done,
    Unrecognized,
}

/// Caller-defined classification of status strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
}

impl StateTable {
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }

    /// States used by the managed Kubernetes cluster service.
    pub fn container() -> Self {
        Self::new([STATUS_PENDING, STATUS_RUNNING], [STATUS_DONE])
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn target(&self) -> impl Iterator<Item = &str> {
        self.target.iter().map(String::as_str)
    }

    pub fn is_pending(&self, status: &str) -> bool {
        self.pending.contains(status)
    }

    pub fn is_target(&self, status: &str) -> bool {
        self.target.contains(status)
    }

    pub fn classify(&self, status: &str) -> OperationPhase {
        // Target wins if a caller lists a state in both tables; validate()
        // rejects that for waiters.
        if self.is_target(status) {
            OperationPhase::Done
        } else if self.is_pending(status) {
            OperationPhase::Pending
        } else {
            OperationPhase::Unrecognized
        }
    }

    /// Target states joined for messages, e.g. `DONE` or `DONE, SUCCEEDED`.
    pub fn describe_target(&self) -> String {
        self.target().collect::<Vec<_>>().join(", ")
    }

    pub(crate) fn validate(&self) -> Result<(), WaiterError> {
        if self.target.is_empty() {
            return Err(WaiterError::NoTargetStates);
        }
        if let Some(state) = self.pending.intersection(&self.target).next() {
            return Err(WaiterError::OverlappingState(state.clone()));
        }
        Ok(())
    }
}

/// Operation resource of the managed Kubernetes cluster API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOperation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl ContainerOperation {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }
}

impl OperationSnapshot for ContainerOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}
