//! Typed error hierarchy for gigsync.
//!
//! Two enums cover the library:
//! - `SyncError`: repository calls and sync-controller operations
//! - `ConfigError`: loading and validating `gigsync.toml`
//!
//! The CLI wraps both in `anyhow` at the edge.

use thiserror::Error;

/// Errors from the gig repository client and the sync controller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection or transport failure before a response arrived.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a 4xx/5xx status.
    #[error("Server returned HTTP {status}{}", detail_suffix(.message))]
    Http { status: u16, message: Option<String> },

    /// The payload did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Gig {id} is not in the current collection")]
    GigNotFound { id: String },

    #[error("Invalid identity '{0}'")]
    InvalidIdentity(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SyncError {
    /// HTTP status carried by this error, if it is an `Http` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn detail_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}
