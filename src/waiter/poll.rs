use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn, Instrument};

use super::{OperationQuery, OperationWaiter, WaitError};
use crate::operation::OperationPhase;
use crate::telemetry::{create_wait_span, generate_correlation_id};

/// How long an in-flight fetch may run past the overall deadline before the
/// wait gives up on it.
pub const REFRESH_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Polls `waiter` until its operation reaches a target state, fails, the
/// waiter's token is cancelled, or `timeout` elapses.
///
/// Fetches are strictly sequential and never issued once cancellation has
/// been observed. Cancellation takes precedence over an elapsed deadline.
/// A target state with a status message is still a failure. A fetch still in
/// flight at the deadline gets [`REFRESH_GRACE_PERIOD`] to answer. A timeout
/// too large to represent as an instant means no deadline.
pub async fn wait<Q: OperationQuery>(
    waiter: &mut OperationWaiter<Q>,
    activity: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), WaitError> {
    let correlation_id = generate_correlation_id();
    let span = create_wait_span(activity, &waiter.op_name().to_string(), &correlation_id);

    poll_until_settled(waiter, activity, timeout, poll_interval)
        .instrument(span)
        .await
}

async fn poll_until_settled<Q: OperationQuery>(
    waiter: &mut OperationWaiter<Q>,
    activity: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), WaitError> {
    let cancel = waiter.cancel_token().clone();
    let started = Instant::now();
    let deadline = started.checked_add(timeout);
    let fetch_deadline = deadline.and_then(|d| d.checked_add(REFRESH_GRACE_PERIOD));
    let mut fetches: u32 = 0;
    let mut not_found_streak: u32 = 0;

    if cancel.is_cancelled() {
        warn!(activity, "Request has been cancelled early");
        return Err(WaitError::Cancelled);
    }

    if waiter.is_done() {
        debug!(activity, status = waiter.state(), "Operation already finished, skipping poll");
        return waiter.error().map_or(Ok(()), Err);
    }

    loop {
        if cancel.is_cancelled() {
            warn!(activity, fetches, "Polling cancelled");
            return Err(WaitError::Cancelled);
        }

        let refreshed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(activity, fetches, "Polling cancelled while fetching operation");
                return Err(WaitError::Cancelled);
            }
            result = waiter.refresh() => Some(result),
            _ = sleep_until_opt(fetch_deadline) => None,
        };
        let Some(refreshed) = refreshed else {
            warn!(activity, fetches, "Fetch still in flight past the deadline");
            return Err(timed_out(waiter, timeout));
        };
        fetches += 1;

        let phase = match refreshed {
            Ok(()) => {
                not_found_streak = 0;
                waiter.states().classify(waiter.state())
            }
            Err(err) if err.is_not_found() && not_found_streak < waiter.not_found_checks() => {
                not_found_streak += 1;
                debug!(
                    operation = %waiter.op_name(),
                    attempt = not_found_streak,
                    error = %err,
                    "Dismissed not-found error on GET operation"
                );
                OperationPhase::Pending
            }
            Err(err) => {
                warn!(activity, fetches, error = %err, "Failed to retrieve operation");
                return Err(WaitError::QueryFailed(err));
            }
        };

        match phase {
            OperationPhase::Done => {
                info!(
                    activity,
                    fetches,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    status = waiter.state(),
                    "Operation finished"
                );
                return waiter.error().map_or(Ok(()), Err);
            }
            OperationPhase::Unrecognized => {
                debug!(
                    operation = %waiter.op_name(),
                    status = waiter.state(),
                    "Got unexpected status while polling for operation"
                );
                return Err(waiter.error().unwrap_or_else(|| WaitError::OperationFailed {
                    message: format!("unexpected state '{}'", waiter.state()),
                }));
            }
            OperationPhase::Pending => {}
        }

        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            return Err(timed_out(waiter, timeout));
        }

        info!(
            activity,
            poll_interval_ms = poll_interval.as_millis() as u64,
            status = waiter.state(),
            "Waiting for operation to finish"
        );
        let delay = deadline.map_or(poll_interval, |d| poll_interval.min(d - now));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(activity, fetches, "Polling cancelled while sleeping");
                return Err(WaitError::Cancelled);
            }
            _ = sleep(delay) => {}
        }

        if deadline.is_some_and(|d| Instant::now() >= d) && !cancel.is_cancelled() {
            return Err(timed_out(waiter, timeout));
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn timed_out<Q: OperationQuery>(waiter: &OperationWaiter<Q>, timeout: Duration) -> WaitError {
    warn!(operation = %waiter.op_name(), status = waiter.state(), ?timeout, "Timed out waiting for operation");
    WaitError::Timeout {
        target: waiter.states().describe_target(),
        last_state: waiter.state().to_string(),
        timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{ContainerOperation, StateTable, STATUS_DONE, STATUS_PENDING, STATUS_RUNNING};
    use crate::waiter::mocks::ScriptedQuery;
    use crate::waiter::QueryError;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    const OP: &str = "operation-123";

    fn pending_waiter(query: Arc<ScriptedQuery>, cancel: CancellationToken) -> OperationWaiter<Arc<ScriptedQuery>> {
        OperationWaiter::new(
            query,
            ContainerOperation::new(OP, STATUS_PENDING),
            "my-project",
            "us-central1",
            StateTable::container(),
            cancel,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_reaches_done() {
        let query = Arc::new(ScriptedQuery::statuses(
            OP,
            &[STATUS_PENDING, STATUS_PENDING, STATUS_RUNNING, STATUS_DONE],
        ));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let started = Instant::now();
        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(5), Duration::from_millis(10)).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(query.calls(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(waiter.state(), STATUS_DONE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_forever_times_out() {
        let query = Arc::new(ScriptedQuery::repeating(ContainerOperation::new(OP, STATUS_RUNNING)));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let started = Instant::now();
        let result = wait(&mut waiter, "updating cluster", Duration::from_millis(50), Duration::from_millis(10)).await;

        match result {
            Err(WaitError::Timeout { target, last_state, .. }) => {
                assert_eq!(target, "DONE");
                assert_eq!(last_state, STATUS_RUNNING);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(query.calls(), 5);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_with_message_fails() {
        let query = Arc::new(ScriptedQuery::new([
            Ok(ContainerOperation::new(OP, STATUS_PENDING)),
            Ok(ContainerOperation::new(OP, STATUS_DONE).with_status_message("quota exceeded")),
        ]));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(5), Duration::from_millis(10)).await;

        match result {
            Err(WaitError::OperationFailed { message }) => assert_eq!(message, "quota exceeded"),
            other => panic!("expected OperationFailed, got {other:?}"),
        }
        assert_eq!(query.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_status_fails_immediately() {
        let query = Arc::new(ScriptedQuery::statuses(OP, &["ABORTING"]));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let result = wait(&mut waiter, "deleting cluster", Duration::from_secs(5), Duration::from_millis(10)).await;

        match result {
            Err(WaitError::OperationFailed { message }) => assert_eq!(message, "unexpected state 'ABORTING'"),
            other => panic!("expected OperationFailed, got {other:?}"),
        }
        assert_eq!(query.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_done_snapshot_skips_fetch() {
        let query = Arc::new(ScriptedQuery::statuses(OP, &[STATUS_RUNNING]));
        let mut waiter = OperationWaiter::new(
            query.clone(),
            ContainerOperation::new(OP, STATUS_DONE),
            "my-project",
            "us-central1",
            StateTable::container(),
            CancellationToken::new(),
        )
        .unwrap();

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(5), Duration::from_millis(10)).await;

        assert!(result.is_ok());
        assert_eq!(query.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep() {
        let query = Arc::new(ScriptedQuery::repeating(ContainerOperation::new(OP, STATUS_RUNNING)));
        let cancel = CancellationToken::new();
        let mut waiter = pending_waiter(query.clone(), cancel.clone());

        let canceller = tokio::spawn(async move {
            sleep(Duration::from_millis(25)).await;
            cancel.cancel();
        });

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(60), Duration::from_millis(10)).await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(WaitError::Cancelled)));
        assert_eq!(query.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_dismissed_until_limit() {
        let not_found = || QueryError::NotFound { name: OP.to_string() };
        let query = Arc::new(ScriptedQuery::new([
            Err(not_found()),
            Err(not_found()),
            Ok(ContainerOperation::new(OP, STATUS_DONE)),
        ]));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(5), Duration::from_millis(10)).await;
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(query.calls(), 3);

        let query = Arc::new(ScriptedQuery::new([Err(not_found()), Err(not_found())]));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new()).with_not_found_checks(1);

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(5), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(WaitError::QueryFailed(QueryError::NotFound { .. }))));
        assert_eq!(query.calls(), 2);
        assert_eq!(waiter.state(), STATUS_PENDING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_ends_wait() {
        let query = Arc::new(ScriptedQuery::new([
            Ok(ContainerOperation::new(OP, STATUS_RUNNING)),
            Err(QueryError::Status {
                status: 403,
                message: "permission denied".to_string(),
            }),
        ]));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(5), Duration::from_millis(10)).await;

        assert!(matches!(result, Err(WaitError::QueryFailed(QueryError::Status { status: 403, .. }))));
        assert_eq!(query.calls(), 2);
        assert_eq!(waiter.state(), STATUS_RUNNING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_is_bounded_by_deadline() {
        let query = Arc::new(
            ScriptedQuery::repeating(ContainerOperation::new(OP, STATUS_RUNNING)).with_latency(Duration::from_secs(300)),
        );
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let started = Instant::now();
        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(1), Duration::from_millis(10)).await;

        match result {
            Err(WaitError::Timeout { last_state, timeout, .. }) => {
                assert_eq!(last_state, STATUS_PENDING);
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(query.calls(), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) + REFRESH_GRACE_PERIOD);
        assert!(elapsed < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let query = Arc::new(ScriptedQuery::statuses(OP, &[STATUS_RUNNING, STATUS_RUNNING, STATUS_DONE]));
        let mut waiter = pending_waiter(query.clone(), CancellationToken::new());

        let result = wait(&mut waiter, "creating cluster", Duration::from_secs(u64::MAX), Duration::from_millis(10)).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(query.calls(), 3);
        assert_eq!(waiter.state(), STATUS_DONE);
    }
}
