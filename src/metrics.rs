//! Fetch metrics collection and reporting
//!
//! Tracks latency percentiles, retry counts and outcome classes for the
//! retrying fetcher.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// How a single `fetch` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    RateLimited,
    Failed,
}

/// Snapshot of fetcher health
#[derive(Debug, Clone, PartialEq)]
pub struct FetchMetrics {
    /// 50th percentile latency of successful fetches, in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful fetches, in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    pub total_fetches: u64,
    pub failed_fetches: u64,
    pub rate_limited_fetches: u64,
    /// Attempts beyond the first, summed over all fetches
    pub total_retries: u64,
}

impl FetchMetrics {
    /// Creates metrics with no data
    pub fn empty() -> Self {
        Self {
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_fetches: 0,
            failed_fetches: 0,
            rate_limited_fetches: 0,
            total_retries: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct FetchSample {
    duration_ms: f64,
    outcome: FetchOutcome,
}

#[derive(Debug, Default)]
struct Totals {
    fetches: u64,
    failed: u64,
    rate_limited: u64,
    retries: u64,
}

/// Collects and computes fetch metrics
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Rolling window of samples
    samples: RwLock<VecDeque<FetchSample>>,
    /// Lifetime counters
    totals: RwLock<Totals>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one fetch with its wall time, attempts used and outcome
    pub async fn record_fetch(&self, duration: Duration, attempts: u32, outcome: FetchOutcome) {
        {
            let mut totals = self.totals.write().await;
            totals.fetches += 1;
            totals.retries += u64::from(attempts.saturating_sub(1));
            match outcome {
                FetchOutcome::Success => {}
                FetchOutcome::RateLimited => {
                    totals.failed += 1;
                    totals.rate_limited += 1;
                }
                FetchOutcome::Failed => totals.failed += 1,
            }
        }

        let mut samples = self.samples.write().await;
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(FetchSample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            outcome,
        });
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> FetchMetrics {
        let samples = self.samples.read().await;
        let totals = self.totals.read().await;

        if totals.fetches == 0 {
            return FetchMetrics::empty();
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .filter(|s| s.outcome == FetchOutcome::Success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        FetchMetrics {
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: (totals.fetches - totals.failed) as f64 / totals.fetches as f64,
            total_fetches: totals.fetches,
            failed_fetches: totals.failed,
            rate_limited_fetches: totals.rate_limited,
            total_retries: totals.retries,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
