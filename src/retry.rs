//! Bounded retry with exponential backoff for collaborator calls.
//!
//! Every external call made by the research loop goes through [`with_retry`].
//! Transient failures (see [`CollaboratorError::is_retryable`]) are retried
//! with an exponentially growing, capped delay; anything else, or running out
//! of retries, is returned to the caller as a hard failure.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::RequestConfig;
use crate::error::{CollaboratorError, CollaboratorResult};

/// Retry policy for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout. Expiry counts as a transient failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Build a policy from the request configuration.
    pub fn from_request_config(config: &RequestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_ms: config.retry_delay_ms,
            backoff_factor: config.backoff_factor,
            max_delay_ms: config.max_retry_delay_ms,
            attempt_timeout_ms: None,
        }
    }

    /// Set the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout_ms: u64) -> Self {
        self.attempt_timeout_ms = Some(timeout_ms);
        self
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_factor.max(1.0).powi(retry as i32 - 1);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Run `call` under `policy`, retrying transient failures.
///
/// Returns the first success, the first non-retryable error unchanged, or
/// [`CollaboratorError::RetriesExhausted`] once the retry budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> CollaboratorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CollaboratorResult<T>>,
{
    let mut retries = 0u32;

    loop {
        let start = Instant::now();
        let outcome = match policy.attempt_timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), call()).await {
                    Ok(result) => result,
                    Err(_) => Err(CollaboratorError::Timeout {
                        operation: operation.to_string(),
                        timeout_ms,
                    }),
                }
            }
            None => call().await,
        };

        match outcome {
            Ok(value) => {
                if retries > 0 {
                    info!(
                        operation = %operation,
                        retries,
                        latency_ms = start.elapsed().as_millis(),
                        "Collaborator call recovered after retry"
                    );
                } else {
                    debug!(
                        operation = %operation,
                        latency_ms = start.elapsed().as_millis(),
                        "Collaborator call succeeded"
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    operation = %operation,
                    error = %e,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Transient collaborator failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_retryable() => {
                error!(
                    operation = %operation,
                    error = %e,
                    attempts = retries + 1,
                    "Collaborator retries exhausted"
                );
                return Err(CollaboratorError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: retries + 1,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                error!(
                    operation = %operation,
                    error = %e,
                    "Non-retryable collaborator failure"
                );
                return Err(e);
            }
        }
    }
}
