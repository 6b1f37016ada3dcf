//! Request metrics for the serialized API channel
//!
//! Tracks end-to-end latency (including backoff waits), success rate and
//! how often the API throttled us.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Snapshot of request metrics
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStats {
    /// 50th percentile latency of successful requests in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful requests in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Total number of requests finished
    pub total_requests: u64,
    /// Requests that gave up after exhausting retries
    pub failed_requests: u64,
    /// HTTP 429 responses seen
    pub throttled_responses: u64,
    /// Retries scheduled after a generic failure
    pub retried_failures: u64,
}

impl RequestStats {
    /// Stats with no data
    pub fn empty() -> Self {
        Self {
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
            throttled_responses: 0,
            retried_failures: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    failed: u64,
    throttled: u64,
    retried: u64,
}

/// Collects metrics for the fetcher
#[derive(Debug, Default)]
pub struct RequestMetrics {
    samples: RwLock<VecDeque<LatencySample>>,
    counters: RwLock<Counters>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(MAX_SAMPLES)),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Records a finished request with its total duration
    pub async fn record_request(&self, duration: Duration, success: bool) {
        {
            let mut counters = self.counters.write().await;
            counters.total += 1;
            if !success {
                counters.failed += 1;
            }
        }

        let mut samples = self.samples.write().await;
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
        });
    }

    /// Records an HTTP 429
    pub async fn record_throttled(&self) {
        self.counters.write().await.throttled += 1;
    }

    /// Records a retry after a generic failure
    pub async fn record_retry(&self) {
        self.counters.write().await.retried += 1;
    }

    /// Computes current stats from collected samples
    pub async fn snapshot(&self) -> RequestStats {
        let samples = self.samples.read().await;
        let counters = self.counters.read().await;

        let mut stats = RequestStats::empty();
        stats.throttled_responses = counters.throttled;
        stats.retried_failures = counters.retried;
        stats.total_requests = counters.total;
        stats.failed_requests = counters.failed;

        if counters.total > 0 {
            stats.success_rate = (counters.total - counters.failed) as f64 / counters.total as f64;
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        stats.latency_p50_ms = percentile(&latencies, 50.0);
        stats.latency_p99_ms = percentile(&latencies, 99.0);
        stats
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
