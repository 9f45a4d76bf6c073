use thiserror::Error;

use crate::error::ConfigError;

pub type HarvestResult<T> = Result<T, HarvestError>;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("unexpected page structure: {0}")]
    Parse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("http status {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("error returned from server: {0}")]
    Upstream(String),
    #[error("continuation token resubmitted on {cursor} cursor")]
    TokenReused { cursor: String, token: String },
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl HarvestError {
    /// Transient failures are retried by [`super::RetryPolicy`]; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::Network(_) | HarvestError::Timeout(_) | HarvestError::RateLimited(_)
        )
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HarvestError::Timeout(err.to_string())
        } else {
            HarvestError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Parse(err.to_string())
    }
}

impl From<tokio::task::JoinError> for HarvestError {
    fn from(err: tokio::task::JoinError) -> Self {
        HarvestError::Unexpected(err.to_string())
    }
}
