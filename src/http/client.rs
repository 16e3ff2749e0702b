use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::operation::{ContainerOperation, OperationName};
use crate::retry::{RetryConfig, RetryHandler};
use crate::waiter::{OperationQuery, QueryError};

const USER_PROJECT_HEADER: &str = "X-Goog-User-Project";

/// Rate-limited client for the container service's operations endpoint
#[derive(Debug)]
pub struct ContainerOperationsClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    user_project_override: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    retry: RetryHandler,
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl ContainerOperationsClient {
    pub fn new(api: &ApiConfig, retry: RetryConfig) -> Result<Self, QueryError> {
        let per_second = NonZeroU32::new(api.rate_limit.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(api.rate_limit.burst_capacity).unwrap_or(per_second);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)));

        let http = reqwest::Client::builder()
            .user_agent(api.user_agent.as_str())
            .build()?;

        info!(
            endpoint = %api.endpoint,
            requests_per_second = per_second.get(),
            burst = burst.get(),
            "Created operations client"
        );

        Ok(Self {
            http,
            endpoint: api.endpoint.trim_end_matches('/').to_string(),
            token: api.token.clone(),
            user_project_override: api.user_project_override.clone(),
            rate_limiter,
            retry: RetryHandler::new(retry),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn operation_url(&self, name: &OperationName) -> String {
        format!("{}/{}", self.endpoint, name)
    }

    /// Fetch an operation, retrying transient failures
    pub async fn get_operation(&self, name: &OperationName) -> Result<ContainerOperation, QueryError> {
        self.retry.execute_with_retry(|| self.get_operation_once(name)).await
    }

    async fn get_operation_once(&self, name: &OperationName) -> Result<ContainerOperation, QueryError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let url = self.operation_url(name);
        debug!(%url, "GET operation");

        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(project) = &self.user_project_override {
            request = request.header(USER_PROJECT_HEADER, project);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(QueryError::NotFound {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        Ok(response.json::<ContainerOperation>().await?)
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.to_string()
    }
}

#[async_trait]
impl OperationQuery for ContainerOperationsClient {
    type Snapshot = ContainerOperation;

    async fn query(&self, name: &OperationName) -> Result<ContainerOperation, QueryError> {
        self.get_operation(name).await
    }
}
