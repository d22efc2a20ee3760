//! Error types for remote retrieval, fund fetching and storage

use std::time::Duration;
use thiserror::Error;

/// Failure of a single script retrieval at the gateway.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The loader finished without delivering anything for the request.
    #[error("Request to {url} was abandoned before delivering a payload")]
    Abandoned { url: String },

    #[error("Script from {url} did not invoke callback {callback}")]
    MissingCallback { url: String, callback: String },

    #[error("Script from {url} did not assign {name}")]
    MissingGlobal { url: String, name: String },

    #[error("Failed to parse payload from {url}: {message}")]
    Parse { url: String, message: String },
}

impl RetrievalError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetrievalError::Timeout { .. })
    }
}

/// Failure of a whole per-fund fetch.
///
/// Only the valuation stage is mandatory, so this is the only way a fetch
/// fails; the other stages degrade to empty data.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch valuation for fund {code}: {source}")]
    Valuation {
        code: String,
        #[source]
        source: RetrievalError,
    },

    #[error("No valuation data for fund {code}")]
    EmptyValuation { code: String },
}

impl FetchError {
    pub fn code(&self) -> &str {
        match self {
            FetchError::Valuation { code, .. } | FetchError::EmptyValuation { code } => code,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
