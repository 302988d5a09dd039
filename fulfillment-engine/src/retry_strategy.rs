// Remote call executor - bounded retry with exponential backoff around one
// outbound call, classifying failures as transient or permanent.

use crate::errors::{FulfillmentError, Result};
use crate::metrics::LEDGER_CALL_RETRIES_TOTAL;
use bytes::Bytes;
use reqwest::{header::HeaderMap, Client, Method, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay slept after failed attempt `attempt` (1-based), before the next one.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = delay_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    /// Network level fault: connect failure, timeout, refused connection,
    /// connection lost while the response body was being read
    Retryable(String),
    /// Anything retrying cannot fix
    Fatal(String),
}

impl From<reqwest::Error> for CallFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout()
            || err.is_connect()
            || err.is_request()
            || err.is_body()
            || err.is_decode()
        {
            CallFailure::Retryable(err.to_string())
        } else {
            CallFailure::Fatal(err.to_string())
        }
    }
}

/// Description of one outbound HTTP call.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub operation: &'static str,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub expected_status: StatusCode,
}

#[derive(Debug, Clone)]
pub struct RemoteCallExecutor {
    policy: RetryPolicy,
}

impl RemoteCallExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it succeeds, fails fatally, or the policy runs out
    /// of attempts. Exhaustion is transient; a fatal failure is permanent.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, CallFailure>>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt_no = 1;

        loop {
            match attempt().await {
                Ok(value) => {
                    if attempt_no > 1 {
                        info!(
                            "Operation {} succeeded on attempt {}/{}",
                            operation, attempt_no, max_attempts
                        );
                    }
                    return Ok(value);
                }
                Err(CallFailure::Fatal(message)) => {
                    warn!("Non-retryable error for {}: {}", operation, message);
                    return Err(FulfillmentError::permanent_remote(operation, message));
                }
                Err(CallFailure::Retryable(message)) => {
                    if attempt_no >= max_attempts {
                        warn!(
                            "Exhausted {} attempts for {}: {}",
                            max_attempts, operation, message
                        );
                        return Err(FulfillmentError::TransientRemote {
                            operation: operation.to_string(),
                            attempts: max_attempts,
                            message,
                        });
                    }

                    let delay = self.policy.backoff_after(attempt_no);
                    warn!(
                        "Attempt {}/{} failed for {}, retrying in {:?}: {}",
                        attempt_no, max_attempts, operation, delay, message
                    );
                    LEDGER_CALL_RETRIES_TOTAL.with_label_values(&[operation]).inc();
                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
            }
        }
    }

    /// Perform `call` over HTTP and return the response body. A status other
    /// than the expected one aborts without retrying.
    pub async fn send(&self, http: &Client, call: &RemoteCall) -> Result<Bytes> {
        let (status, body) = self
            .execute(call.operation, move || async move {
                let response = http
                    .request(call.method.clone(), call.url.as_str())
                    .headers(call.headers.clone())
                    .body(call.body.clone())
                    .send()
                    .await?;
                let status = response.status();
                let body = response.bytes().await?;
                Ok::<_, CallFailure>((status, body))
            })
            .await?;

        if status != call.expected_status {
            return Err(FulfillmentError::permanent_remote(
                call.operation,
                format!(
                    "{} {} returned status {} (expected {}): {}",
                    call.method,
                    call.url,
                    status,
                    call.expected_status,
                    String::from_utf8_lossy(&body)
                ),
            ));
        }

        Ok(body)
    }
}
