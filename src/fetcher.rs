//! Retrying fetcher: bounded exponential backoff, rate-limit classification
//! and decoding on top of a `Transport`

use crate::{
    config::RetryPolicy,
    error::FetchError,
    metrics::{FetchMetrics, FetchOutcome, MetricsCollector},
    transport::{HttpRequest, HttpResponse, Transport},
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sleeps between attempts. Injected so tests can observe the schedule
/// without waiting on a real clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt counter and current delay for one `fetch` call
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: u32,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts.max(1),
            attempts: 0,
            delay: policy.initial_backoff,
        }
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Records a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self.delay;
        self.delay = self.delay.saturating_mul(2);
        Some(delay)
    }
}

/// Reads `Retry-After` as whole seconds. HTTP-date values are not supported.
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok())
}

/// Maps a status code to the error taxonomy; `Ok` carries the body to decode
fn check_status(response: &HttpResponse) -> Result<&[u8], FetchError> {
    match response.status {
        429 => Err(FetchError::RateLimited {
            retry_after_secs: parse_retry_after(response.header("retry-after")),
        }),
        200..=299 => Ok(response.body.as_slice()),
        status => Err(FetchError::Http { status }),
    }
}

/// Wraps a transport with retry, rate-limit detection and decoding
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    metrics: MetricsCollector,
}

impl RetryingFetcher {
    /// Creates a fetcher that sleeps on the tokio clock
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(transport, policy, Arc::new(TokioSleeper))
    }

    /// Creates a fetcher with a custom sleeper
    pub fn with_sleeper(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            transport,
            policy,
            sleeper,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Name of the underlying transport
    pub fn transport_name(&self) -> &'static str {
        self.transport.transport_name()
    }

    /// Fetches `request` and decodes the body with `decode`.
    ///
    /// `RateLimited` and `InvalidRequest` end the call immediately; any other
    /// failure is retried until the attempt budget is spent, after which the
    /// last error is returned unchanged.
    pub async fn fetch<T, F>(&self, request: &HttpRequest, decode: F) -> Result<T, FetchError>
    where
        F: Fn(&[u8]) -> Result<T, FetchError> + Send + Sync,
        T: Send,
    {
        let start = Instant::now();
        let mut backoff = Backoff::new(self.policy);

        loop {
            let err = match self.attempt(request, &decode).await {
                Ok(value) => {
                    let attempts = backoff.attempts() + 1;
                    tracing::debug!(
                        url = %request.url,
                        transport = self.transport_name(),
                        attempts,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Fetch succeeded"
                    );
                    self.metrics
                        .record_fetch(start.elapsed(), attempts, FetchOutcome::Success)
                        .await;
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                let outcome = if err.is_rate_limited() {
                    tracing::info!(
                        url = %request.url,
                        transport = self.transport_name(),
                        error = %err,
                        "Rate limited, not retrying"
                    );
                    FetchOutcome::RateLimited
                } else {
                    FetchOutcome::Failed
                };
                self.metrics
                    .record_fetch(start.elapsed(), backoff.attempts() + 1, outcome)
                    .await;
                return Err(err);
            }

            match backoff.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        url = %request.url,
                        transport = self.transport_name(),
                        attempt = backoff.attempts(),
                        max_attempts = backoff.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Fetch failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    tracing::warn!(
                        url = %request.url,
                        transport = self.transport_name(),
                        attempts = backoff.attempts(),
                        error = %err,
                        "Fetch failed, giving up"
                    );
                    self.metrics
                        .record_fetch(start.elapsed(), backoff.attempts(), FetchOutcome::Failed)
                        .await;
                    return Err(err);
                }
            }
        }
    }

    /// Fetches `request` and deserializes the body as JSON
    pub async fn fetch_json<T>(&self, request: &HttpRequest) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Send,
    {
        self.fetch(request, |body| {
            serde_json::from_slice::<T>(body).map_err(FetchError::from)
        })
        .await
    }

    async fn attempt<T, F>(&self, request: &HttpRequest, decode: &F) -> Result<T, FetchError>
    where
        F: Fn(&[u8]) -> Result<T, FetchError> + Send + Sync,
        T: Send,
    {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| FetchError::Transport(e.0))?;
        let body = check_status(&response)?;
        decode(body)
    }

    /// Latency and outcome statistics for this fetcher
    pub async fn metrics(&self) -> FetchMetrics {
        self.metrics.get_metrics().await
    }
}
