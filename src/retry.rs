//! Per-request retry state machine and the fetcher that drives it
//!
//! Throttling (HTTP 429) and generic failures are budgeted separately:
//!
//! - throttled: wait `min(20 × (n+1), 120)` units and retry; the
//!   `max_attempts + 1`-th consecutive 429 is terminal
//! - failed (transport error, non-2xx, undecodable body): wait `10 × (n+1)`
//!   units and retry; the `max_attempts`-th failure is terminal

use crate::{
    config::LoaderConfig,
    constants::{FAILURE_BACKOFF_UNITS, MAX_THROTTLE_BACKOFF_UNITS, THROTTLE_BACKOFF_UNITS},
    error::ProviderError,
    metrics::RequestMetrics,
    transport::HttpTransport,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self { max_attempts, unit }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.max_retries, config.delay_unit)
    }

    /// Wait after the `attempt`-th (0-based) generic failure
    pub fn failure_delay(&self, attempt: u32) -> Duration {
        self.unit * FAILURE_BACKOFF_UNITS.saturating_mul(attempt + 1)
    }

    /// Wait after the `attempt`-th (0-based) throttled response
    pub fn throttle_delay(&self, attempt: u32) -> Duration {
        let units = THROTTLE_BACKOFF_UNITS
            .saturating_mul(attempt + 1)
            .min(MAX_THROTTLE_BACKOFF_UNITS);
        self.unit * units
    }
}

/// What to do after an unsuccessful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    Retry(Duration),
    /// Stop and report the last error
    GiveUp,
}

/// Attempt bookkeeping for one request
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    throttled: u32,
    failures: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            throttled: 0,
            failures: 0,
        }
    }

    /// Registers an HTTP 429
    pub fn on_throttled(&mut self) -> RetryDecision {
        self.throttled += 1;
        if self.throttled > self.policy.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.policy.throttle_delay(self.throttled - 1))
        }
    }

    /// Registers a generic failure
    pub fn on_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.policy.failure_delay(self.failures - 1))
        }
    }

    pub fn throttled(&self) -> u32 {
        self.throttled
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

enum AttemptError {
    Throttled,
    Failed(ProviderError),
}

/// Issues GETs through a transport, retrying per `RetryPolicy`
pub struct RetryingFetcher {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    metrics: Arc<RequestMetrics>,
}

impl RetryingFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        metrics: Arc<RequestMetrics>,
    ) -> Self {
        Self {
            transport,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches `url` and decodes the JSON body as `T`, retrying on
    /// throttling and failures until the policy gives up.
    pub async fn fetch_with_retry<T>(&self, url: &str) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let mut state = RetryState::new(self.policy);

        loop {
            let (decision, error) = match self.attempt::<T>(url).await {
                Ok(value) => {
                    self.metrics.record_request(start.elapsed(), true).await;
                    return Ok(value);
                }
                Err(AttemptError::Throttled) => {
                    self.metrics.record_throttled().await;
                    let decision = state.on_throttled();
                    let error = ProviderError::RateLimitExceeded {
                        attempts: state.throttled(),
                    };
                    (decision, error)
                }
                Err(AttemptError::Failed(e)) => (state.on_failure(), e),
            };

            match decision {
                RetryDecision::Retry(delay) => {
                    if matches!(error, ProviderError::RateLimitExceeded { .. }) {
                        tracing::warn!(
                            attempt = state.throttled(),
                            max_attempts = self.policy.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            url,
                            "Rate limit hit, waiting before retry"
                        );
                    } else {
                        self.metrics.record_retry().await;
                        tracing::warn!(
                            attempt = state.failures(),
                            max_attempts = self.policy.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            url,
                            "Request failed, retrying"
                        );
                    }
                    sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::error!(error = %error, url, "Giving up on request");
                    self.metrics.record_request(start.elapsed(), false).await;
                    return Err(error);
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, url: &str) -> Result<T, AttemptError> {
        let response = self
            .transport
            .get(url)
            .await
            .map_err(AttemptError::Failed)?;

        if response.is_throttled() {
            return Err(AttemptError::Throttled);
        }

        if !response.is_success() {
            return Err(AttemptError::Failed(ProviderError::HttpStatus {
                status: response.status,
            }));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            AttemptError::Failed(ProviderError::invalid_response(format!(
                "Failed to parse response from {}: {}",
                url, e
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn fetcher(transport: Arc<MockTransport>) -> (RetryingFetcher, Arc<RequestMetrics>) {
        let metrics = Arc::new(RequestMetrics::new());
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        (
            RetryingFetcher::new(transport, policy, metrics.clone()),
            metrics,
        )
    }

    fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_throttle_delay_escalates_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        let delays: Vec<u64> = (0..8).map(|i| policy.throttle_delay(i).as_secs()).collect();
        assert_eq!(delays, vec![20, 40, 60, 80, 100, 120, 120, 120]);
    }

    #[test]
    fn test_state_machine_budgets_are_separate() {
        let mut state = RetryState::new(RetryPolicy::new(3, Duration::from_secs(1)));
        assert_eq!(state.on_failure(), RetryDecision::Retry(Duration::from_secs(10)));
        assert_eq!(state.on_throttled(), RetryDecision::Retry(Duration::from_secs(20)));
        assert_eq!(state.on_throttled(), RetryDecision::Retry(Duration::from_secs(40)));
        assert_eq!(state.on_failure(), RetryDecision::Retry(Duration::from_secs(20)));
        assert_eq!(state.on_throttled(), RetryDecision::Retry(Duration::from_secs(60)));
        assert_eq!(state.on_failure(), RetryDecision::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_three_times_then_succeeds() {
        let transport = Arc::new(MockTransport::new());
        for _ in 0..3 {
            transport.push_status(429);
        }
        transport.push_response(200, r#"{"ok":true}"#);
        let (fetcher, metrics) = fetcher(transport.clone());

        let value: serde_json::Value = fetcher.fetch_with_retry("http://api/x").await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(transport.call_count(), 4);
        assert_eq!(
            gaps(&transport.call_times()),
            vec![
                Duration::from_secs(20),
                Duration::from_secs(40),
                Duration::from_secs(60)
            ]
        );
        let stats = metrics.snapshot().await;
        assert_eq!(stats.throttled_responses, 3);
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_throttling_is_terminal() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fallback(429, "");
        let (fetcher, _) = fetcher(transport.clone());

        let err = fetcher
            .fetch_with_retry::<serde_json::Value>("http://api/x")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RateLimitExceeded { attempts: 4 }));
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_stops_after_max_attempts() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fallback(500, "oops");
        let (fetcher, metrics) = fetcher(transport.clone());

        let err = fetcher
            .fetch_with_retry::<serde_json::Value>("http://api/x")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::HttpStatus { status: 500 }));
        assert_eq!(err.to_string(), "HTTP error! status: 500");
        assert_eq!(transport.call_count(), 3);
        assert_eq!(
            gaps(&transport.call_times()),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );

        // no stray attempts after the terminal error
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.call_count(), 3);
        assert_eq!(metrics.snapshot().await.failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_then_success() {
        let transport = Arc::new(MockTransport::new());
        transport.push_failure("connection reset");
        transport.push_response(200, "[1,2,3]");
        let (fetcher, _) = fetcher(transport.clone());

        let value: Vec<u32> = fetcher.fetch_with_retry("http://api/x").await.unwrap();

        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_body_counts_as_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fallback(200, "<html>maintenance</html>");
        let (fetcher, _) = fetcher(transport.clone());

        let err = fetcher
            .fetch_with_retry::<Vec<u32>>("http://api/x")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
        assert_eq!(transport.call_count(), 3);
    }
}
