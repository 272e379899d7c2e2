use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};
use crate::retry::RetryPolicy;

/// HTTP client for running Langbase pipes.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct LangbaseClient {
    http: Client,
    run_url: String,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
    retry: RetryPolicy,
}

impl LangbaseClient {
    /// Create a client. `request_config` sets the per-request timeout and the
    /// transport-level retry policy.
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            http,
            run_url: format!("{}/v1/pipes/run", base_url),
            base_url,
            api_key: config.api_key.clone(),
            timeout_ms: request_config.timeout_ms,
            retry: RetryPolicy::from_request_config(&request_config),
        })
    }

    /// Run a pipe and return its response.
    ///
    /// Retryable failures (429, 5xx, timeouts, transport errors) are retried
    /// with exponential backoff; other errors are returned immediately.
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let mut last_error = None;
        let mut attempts = 0;

        for retry in 0..=self.retry.max_retries {
            if retry > 0 {
                let delay = self.retry.delay_for(retry);
                warn!(
                    pipe = %request.name,
                    retry,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            attempts += 1;

            match self.send_once(&request).await {
                Ok(response) => {
                    info!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis(),
                        total_tokens = ?response.total_tokens(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %request.name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry,
                        retryable = e.is_retryable(),
                        "Langbase pipe call failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: attempts,
        })
    }

    async fn send_once(&self, request: &PipeRequest) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .http
            .post(&self.run_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<PipeResponse>()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
