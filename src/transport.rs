//! HTTP transport abstraction underneath the retrying fetcher

use crate::{config::LoaderConfig, constants::USER_AGENT, error::ProviderError};
use async_trait::async_trait;
use reqwest::Client;

/// Status code the API uses to signal throttling
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Raw response of a single GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for HTTP 429
    pub fn is_throttled(&self) -> bool {
        self.status == STATUS_TOO_MANY_REQUESTS
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one network round trip; no retries, no queueing
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issues a GET for `url` and returns whatever status came back.
    /// Errors are reserved for failures that produced no response at all.
    async fn get(&self, url: &str) -> Result<HttpResponse, ProviderError>;
}

/// Transport backed by `reqwest`
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the configured timeout and user agent
    pub fn new(config: &LoaderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
        tracing::trace!(url, "GET");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::NetworkError(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(ProviderError::NetworkError)?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Scripted reply for the mock transport
    pub enum MockReply {
        Respond(HttpResponse),
        Fail(String),
    }

    /// Mock transport replaying scripted replies in order
    ///
    /// Once the script runs dry the fallback reply is used for every call.
    pub struct MockTransport {
        script: Mutex<VecDeque<MockReply>>,
        fallback: Mutex<Option<HttpResponse>>,
        calls: Arc<Mutex<Vec<(String, Instant)>>>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn push_status(&self, status: u16) {
            self.push_response(status, "");
        }

        pub fn push_response(&self, status: u16, body: &str) {
            self.script
                .lock()
                .unwrap()
                .push_back(MockReply::Respond(HttpResponse::new(status, body)));
        }

        pub fn push_failure(&self, msg: &str) {
            self.script
                .lock()
                .unwrap()
                .push_back(MockReply::Fail(msg.to_string()));
        }

        pub fn set_fallback(&self, status: u16, body: &str) {
            *self.fallback.lock().unwrap() = Some(HttpResponse::new(status, body));
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }

        pub fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), Instant::now()));

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(MockReply::Respond(response)) => Ok(response),
                Some(MockReply::Fail(msg)) => Err(ProviderError::Transport(msg)),
                None => match self.fallback.lock().unwrap().clone() {
                    Some(response) => Ok(response),
                    None => Err(ProviderError::Transport(format!(
                        "no scripted reply for {}",
                        url
                    ))),
                },
            }
        }
    }
}
