//! Error types for the distributor

use reqwest::StatusCode;
use rewards_core::{ConsistencyError, ReplayError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistributorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Subgraph error from {url}: {message}")]
    Subgraph { url: String, message: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Inconsistent data: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Replay failed: {0}")]
    Replay(#[from] ReplayError),
}

impl DistributorError {
    pub fn subgraph(url: &str, message: impl Into<String>) -> Self {
        Self::Subgraph {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Whether retrying the same request may succeed. HTTP failures are
    /// transient only for timeouts, connection errors, rate limiting and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err
                        .status()
                        .is_some_and(|status| status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
            }
            Self::Subgraph { .. } | Self::Rpc(_) => true,
            _ => false,
        }
    }
}

impl From<toml::de::Error> for DistributorError {
    fn from(err: toml::de::Error) -> Self {
        DistributorError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for DistributorError {
    fn from(err: toml::ser::Error) -> Self {
        DistributorError::InvalidConfig(err.to_string())
    }
}

pub type DistributorResult<T> = Result<T, DistributorError>;
