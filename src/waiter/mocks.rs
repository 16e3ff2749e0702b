// Scripted query for tests - no network, fixed responses

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{OperationQuery, QueryError};
use crate::operation::{ContainerOperation, OperationName};

/// Replays a fixed sequence of fetch results and counts the fetches.
///
/// Once the script runs out, the last successful snapshot is returned for
/// every further fetch; with no successful snapshot it keeps answering
/// "not found".
#[derive(Debug, Default)]
pub struct ScriptedQuery {
    script: Mutex<VecDeque<Result<ContainerOperation, QueryError>>>,
    last: Mutex<Option<ContainerOperation>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedQuery {
    pub fn new(responses: impl IntoIterator<Item = Result<ContainerOperation, QueryError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// One successful snapshot per status, all named `name`.
    pub fn statuses(name: &str, statuses: &[&str]) -> Self {
        Self::new(
            statuses
                .iter()
                .map(|status| Ok(ContainerOperation::new(name, *status))),
        )
    }

    /// Answers every fetch with `op`.
    pub fn repeating(op: ContainerOperation) -> Self {
        Self {
            last: Mutex::new(Some(op)),
            ..Self::default()
        }
    }

    /// Each fetch takes `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, name: &OperationName) -> Result<ContainerOperation, QueryError> {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match scripted {
            Some(Ok(op)) => {
                *last = Some(op.clone());
                Ok(op)
            }
            Some(Err(err)) => Err(err),
            None => last.clone().ok_or_else(|| QueryError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl OperationQuery for ScriptedQuery {
    type Snapshot = ContainerOperation;

    async fn query(&self, name: &OperationName) -> Result<ContainerOperation, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_response(name)
    }
}
