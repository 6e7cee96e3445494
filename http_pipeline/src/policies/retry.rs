use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{Backoff, BackoffConfig};
use http::{HeaderMap, StatusCode};
use observability_deps::tracing::debug;

use crate::{
    Error,
    policy::{Next, Policy},
    request::Request,
    response::Response,
};

/// Configuration for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Response statuses that are worth another attempt.
    pub retryable_statuses: HashSet<StatusCode>,

    /// Wait schedule between attempts.
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retryable_statuses: HashSet::from([
                StatusCode::REQUEST_TIMEOUT,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ]),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Re-runs the downstream chain on transient failures.
///
/// A failure is transient when the response status is in the configured set
/// or when the downstream error is classified retryable (all transport
/// errors are). Requests marked non-idempotent are never resent. Once the
/// attempt budget is spent the last response or error is returned untouched,
/// so callers always observe what the service actually said last.
#[derive(Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    async fn send(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        let mut backoff = Backoff::new(&self.config.backoff);
        let mut attempt = 1_u32;

        loop {
            let result = next.run(request).await;

            let retryable = match &result {
                Ok(response) => self.config.retryable_statuses.contains(&response.status),
                Err(error) => error.is_retryable(),
            };

            if !retryable || !request.options.idempotent || attempt >= self.config.max_attempts {
                return result;
            }

            let wait = match &result {
                Ok(response) => retry_after(&response.headers),
                Err(_) => None,
            }
            .unwrap_or_else(|| backoff.next());

            debug!(
                attempt,
                wait_ms = wait.as_millis() as u64,
                method = %request.method,
                url = %request.url,
                "retrying request",
            );

            // Dropping the failed response releases its connection before
            // the wait
            drop(result);
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

/// `Retry-After` in its delta-seconds form, when the service sent one.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?;
    let seconds: u64 = value.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}
