// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bounded retry with a fixed delay for Director calls and target-cluster writes.
//!
//! This is the inner of two retry layers: a tight loop around a single external
//! call (seconds scale), while the controller requeue handles everything else
//! (seconds to minutes). Inner exhaustion surfaces as an error, which the
//! controller turns into a requeue.
//!
//! Control-plane calls are never retried here; a failed call simply fails the
//! reconciliation. They are bounded by [`with_deadline`] instead.

use reqwest::StatusCode;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS};

/// Errors that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for kube::Error {
    fn is_transient(&self) -> bool {
        is_retryable_error(self)
    }
}

/// Fixed-delay retry policy: no exponential growth, no jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub attempts: u32,
    /// Sleep between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_ATTEMPTS,
            Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        )
    }
}

/// The last error of a retried operation, with attempt context.
#[derive(Error, Debug)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E> {
    /// Human-readable operation name
    pub operation: String,
    /// Number of attempts made
    pub attempts: u32,
    /// The error returned by the last attempt
    pub source: E,
}

/// Run `operation` until it succeeds, returns a non-transient error, or the
/// attempt budget is spent.
///
/// The sleep between attempts is a plain `tokio::time::sleep`, so dropping the
/// returned future (e.g. on a reconcile deadline) abandons the remaining attempts.
/// An in-flight attempt is never preempted by the helper itself.
///
/// # Errors
///
/// Returns the last error wrapped in [`RetryError`] once the budget is exhausted,
/// or immediately for a non-transient error.
///
/// # Example
///
/// ```no_run
/// use compass_manager::reconcilers::retry::{retry_on_error, RetryPolicy};
/// use k8s_openapi::api::core::v1::Secret;
/// use kube::{Api, Client};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let secrets: Api<Secret> = Api::namespaced(client, "kyma-system");
///
/// let secret = retry_on_error(&RetryPolicy::default(), "get agent configuration", || async {
///     secrets.get_opt("compass-agent-configuration").await
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_on_error<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display + Debug,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_transient() {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %e,
                        "Non-retryable error, failing immediately"
                    );
                    return Err(RetryError {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }

                if attempt >= policy.attempts {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Retry budget exhausted, giving up"
                    );
                    return Err(RetryError {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    retry_after = ?policy.delay,
                    error = %e,
                    "Retryable error, will retry"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// Bound a control-plane call by `deadline`.
///
/// An elapsed deadline is reported as [`kube::Error::Service`], which
/// [`is_retryable_error`] classifies as transient.
///
/// # Errors
///
/// Returns the call's own error, or a service error once `deadline` elapsed.
pub async fn with_deadline<T, Fut>(deadline: Duration, call: Fut) -> Result<T, kube::Error>
where
    Fut: Future<Output = Result<T, kube::Error>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(elapsed) => {
            warn!(deadline = ?deadline, "Control-plane call timed out");
            Err(kube::Error::Service(Box::new(elapsed)))
        }
    }
}

/// Determine if an HTTP status code is retryable.
///
/// # Retryable Status Codes
///
/// - **429** (Too Many Requests) - Rate limiting
/// - **500** (Internal Server Error) - Server error
/// - **502** (Bad Gateway) - Proxy/gateway error
/// - **503** (Service Unavailable) - Temporary unavailability
/// - **504** (Gateway Timeout) - Gateway timeout
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Determine if a Kubernetes error is retryable.
///
/// # Retryable Errors
///
/// - **HTTP 429** (Too Many Requests) - Rate limiting
/// - **HTTP 5xx** (Server Errors) - Temporary API server issues
/// - **Service Errors** - Network/connection issues
///
/// # Non-Retryable Errors
///
/// - **HTTP 4xx** (Client Errors, except 429) - Invalid request, not found, unauthorized, etc.
/// - **Invalid Request** - Malformed data, schema violations
#[must_use]
pub fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
