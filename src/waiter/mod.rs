//! Long-running operation waiter.
//!
//! An [`OperationWaiter`] holds the latest known snapshot of one operation
//! together with what it needs to refresh it: the [`OperationQuery`]
//! capability, the qualified name, the state tables and a cancellation token.
//! [`wait`] drives it until the operation settles.

pub mod errors;
pub mod mocks;
mod poll;

pub use errors::{QueryError, WaitError, WaiterError};
pub use poll::wait;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::operation::{OperationName, OperationSnapshot, StateTable};

/// Consecutive "not found" fetches tolerated before giving up. Operations can
/// briefly 404 right after they are created.
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Fetches the current state of an operation.
///
/// Implementations retry transient failures internally; an `Err` here ends
/// the wait.
#[cfg_attr(test, mockall::automock(type Snapshot = crate::operation::ContainerOperation;))]
#[async_trait]
pub trait OperationQuery: Send + Sync {
    type Snapshot: OperationSnapshot;

    async fn query(&self, name: &OperationName) -> Result<Self::Snapshot, QueryError>;
}

#[async_trait]
impl<Q: OperationQuery + ?Sized> OperationQuery for Arc<Q> {
    type Snapshot = Q::Snapshot;

    async fn query(&self, name: &OperationName) -> Result<Self::Snapshot, QueryError> {
        (**self).query(name).await
    }
}

#[async_trait]
impl<Q: OperationQuery + ?Sized> OperationQuery for &Q {
    type Snapshot = Q::Snapshot;

    async fn query(&self, name: &OperationName) -> Result<Self::Snapshot, QueryError> {
        (**self).query(name).await
    }
}

pub struct OperationWaiter<Q: OperationQuery> {
    query: Q,
    name: OperationName,
    snapshot: Q::Snapshot,
    states: StateTable,
    cancel: CancellationToken,
    not_found_checks: u32,
}

impl<Q: OperationQuery> OperationWaiter<Q> {
    /// Binds a waiter to `snapshot`, the operation as returned by the call
    /// that started it.
    pub fn new(
        query: Q,
        snapshot: Q::Snapshot,
        project: &str,
        location: &str,
        states: StateTable,
        cancel: CancellationToken,
    ) -> Result<Self, WaiterError> {
        if snapshot.name().is_empty() {
            return Err(WaiterError::MissingOperationName);
        }
        states.validate()?;
        let name = OperationName::for_operation(project, location, snapshot.name())?;

        Ok(Self {
            query,
            name,
            snapshot,
            states,
            cancel,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
        })
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn op_name(&self) -> &OperationName {
        &self.name
    }

    pub fn snapshot(&self) -> &Q::Snapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> Q::Snapshot {
        self.snapshot
    }

    pub fn state(&self) -> &str {
        self.snapshot.status()
    }

    pub fn states(&self) -> &StateTable {
        &self.states
    }

    pub fn not_found_checks(&self) -> u32 {
        self.not_found_checks
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the held snapshot is already in a target state.
    pub fn is_done(&self) -> bool {
        self.states.is_target(self.state())
    }

    /// Classification of the held snapshot. `None` while pending, even if
    /// the operation will eventually fail.
    pub fn error(&self) -> Option<WaitError> {
        self.snapshot
            .error_from_snapshot(&self.states)
            .map(|message| WaitError::OperationFailed { message })
    }

    /// Fetches a fresh snapshot and replaces the held one. On error the
    /// previous snapshot is kept.
    pub(crate) async fn refresh(&mut self) -> Result<(), QueryError> {
        let fetched = self.query.query(&self.name).await?;
        if !self.name.matches(fetched.name()) {
            return Err(QueryError::NameMismatch {
                expected: self.name.to_string(),
                found: fetched.name().to_string(),
            });
        }
        self.snapshot = fetched;
        Ok(())
    }
}
