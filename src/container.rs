//! Waiting on managed Kubernetes cluster operations.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::PollingConfig;
use crate::operation::{ContainerOperation, StateTable};
use crate::waiter::{wait, OperationQuery, OperationWaiter, WaitError, WaiterError};

#[derive(Debug, Error)]
pub enum ContainerWaitError {
    #[error(transparent)]
    Setup(#[from] WaiterError),

    #[error("Error waiting for {activity}: {source}")]
    Wait {
        activity: String,
        #[source]
        source: WaitError,
    },
}

impl ContainerWaitError {
    /// The poll loop failure, if the wait got that far.
    pub fn wait_error(&self) -> Option<&WaitError> {
        match self {
            ContainerWaitError::Wait { source, .. } => Some(source),
            ContainerWaitError::Setup(_) => None,
        }
    }
}

/// Blocks until a cluster operation started in `project`/`location` is
/// `DONE`, polling through `client`.
pub async fn container_operation_wait<Q>(
    client: Q,
    op: ContainerOperation,
    project: &str,
    location: &str,
    activity: &str,
    polling: &PollingConfig,
    cancel: CancellationToken,
) -> Result<ContainerOperation, ContainerWaitError>
where
    Q: OperationQuery<Snapshot = ContainerOperation>,
{
    let mut waiter = OperationWaiter::new(client, op, project, location, StateTable::container(), cancel)?
        .with_not_found_checks(polling.not_found_checks);

    wait(&mut waiter, activity, polling.timeout(), polling.poll_interval())
        .await
        .map_err(|source| ContainerWaitError::Wait {
            activity: activity.to_string(),
            source,
        })?;

    Ok(waiter.into_snapshot())
}
