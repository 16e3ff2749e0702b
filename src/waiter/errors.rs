use std::time::Duration;
use thiserror::Error;

/// Why a wait ended without the operation succeeding.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("unable to finish polling, context has been cancelled")]
    Cancelled,

    #[error("timeout while waiting for state to become '{target}' (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        target: String,
        last_state: String,
        timeout: Duration,
    },

    #[error("error while retrieving operation: {0}")]
    QueryFailed(#[from] QueryError),

    /// Terminal state carrying a status message, or a status outside both
    /// state tables.
    #[error("{message}")]
    OperationFailed { message: String },
}

impl WaitError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// A waiter could not be constructed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaiterError {
    #[error("cannot wait on an operation without a name")]
    MissingOperationName,

    #[error("invalid operation name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("at least one target state is required")]
    NoTargetStates,

    #[error("state '{0}' is listed as both pending and target")]
    OverlappingState(String),
}

/// A single operation fetch failed after its own retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("network error: {message}")]
    Transport { message: String },

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("operation {name} not found")]
    NotFound { name: String },

    #[error("invalid operation payload: {message}")]
    Decode { message: String },

    #[error("request did not complete within {budget:?}")]
    Timeout { budget: Duration },

    #[error("fetched operation '{found}' while waiting on '{expected}'")]
    NameMismatch { expected: String, found: String },
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound { .. })
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            QueryError::Decode {
                message: err.to_string(),
            }
        } else {
            QueryError::Transport {
                message: err.to_string(),
            }
        }
    }
}
