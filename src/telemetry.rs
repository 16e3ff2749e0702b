use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over the configured level. JSON output carries
/// the current span so wait correlation ids show up on every poll line.
pub fn init_telemetry(observability: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))?;

    let json_layer = observability.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
    });
    let text_layer = (!observability.json).then(|| tracing_subscriber::fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::debug!("opwait telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one wait
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span covering one blocking wait
pub fn create_wait_span(activity: &str, operation: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "operation_wait",
        activity = activity,
        operation.name = operation,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}
