// Bounded retry for a single operation fetch.
// Transient failures are retried here so the poll loop only sees final results.

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

use crate::waiter::QueryError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    /// Budget for the whole attempt sequence, backoff included.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute a fetch with exponential backoff retry
    pub async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
    {
        // Doubles from base_delay: 2^n * (base_delay / 2).
        let half_base_ms = (self.config.base_delay.as_millis() as u64 / 2).max(1);
        let use_jitter = self.config.jitter;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(half_base_ms)
            .max_delay(self.config.max_delay)
            .take(self.config.max_retries as usize)
            .map(move |delay| if use_jitter { jitter(delay) } else { delay });

        let operation_id = uuid::Uuid::new_v4();
        debug!(
            "Starting retry operation {} with max {} retries",
            operation_id, self.config.max_retries
        );

        let attempts = RetryIf::spawn(strategy, operation, |err: &QueryError| {
            let retry = Self::should_retry(err);
            if retry {
                warn!("Operation {} failed (retryable): {}", operation_id, err);
            } else {
                error!("Operation {} failed (non-retryable): {}", operation_id, err);
            }
            retry
        });

        match tokio::time::timeout(self.config.timeout, attempts).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Operation {} exceeded its {:?} budget", operation_id, self.config.timeout);
                Err(QueryError::Timeout {
                    budget: self.config.timeout,
                })
            }
        }
    }

    /// Transport failures, throttling and 5xx gateway errors are retryable.
    pub fn should_retry(error: &QueryError) -> bool {
        match error {
            QueryError::Transport { .. } => true,
            QueryError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            QueryError::NotFound { .. }
            | QueryError::Decode { .. }
            | QueryError::Timeout { .. }
            | QueryError::NameMismatch { .. } => false,
        }
    }
}
