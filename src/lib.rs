// opwait - wait for long-running cloud operations
// Turns an asynchronous control-plane operation into a blocking call with
// timeout, cancellation and typed failures.

pub mod config;
pub mod container;
pub mod http;
pub mod operation;
pub mod retry;
pub mod shutdown;
pub mod telemetry;
pub mod waiter;

// Re-export key types for easy access
pub use config::OpWaitConfig;
pub use container::{container_operation_wait, ContainerWaitError};
pub use http::ContainerOperationsClient;
pub use operation::{ContainerOperation, OperationName, OperationPhase, OperationSnapshot, StateTable};
pub use retry::{RetryConfig, RetryHandler};
pub use shutdown::ShutdownCoordinator;
pub use telemetry::{create_wait_span, generate_correlation_id, init_telemetry};
pub use waiter::{wait, OperationQuery, OperationWaiter, QueryError, WaitError, WaiterError};
