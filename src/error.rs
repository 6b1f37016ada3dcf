//! Error types for the market dashboard loader

use crate::types::LoadStep;
use thiserror::Error;

/// Errors that can occur while fetching a single resource from the API
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed inside the HTTP client
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Transport failed without an HTTP client error attached
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Still throttled (HTTP 429) after every throttle retry
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// Non-2xx status other than 429
    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16 },

    /// Endpoint not offered by this data source
    #[error("Unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Request queue or queued operation failed internally
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Creates an Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates an InvalidResponse error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}

/// Errors surfaced by a pipeline run
///
/// Cloneable so one failure can be handed to every caller sharing the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A step exhausted its retries; the remaining steps were skipped
    #[error("{message}")]
    StepFailed { step: LoadStep, message: String },

    /// The run was replaced by a refetch before it finished
    #[error("Data load was cancelled by a refresh")]
    Abandoned,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoadError {
    /// Creates a StepFailed error from the provider failure that ended the step
    pub fn step_failed(step: LoadStep, err: &ProviderError) -> Self {
        Self::StepFailed {
            step,
            message: err.to_string(),
        }
    }

    /// Creates an Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Step that failed, if the error came from a step
    pub fn step(&self) -> Option<LoadStep> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}
