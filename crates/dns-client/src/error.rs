//! DNS client errors

use thiserror::Error;

/// Errors that can occur when interacting with the DNS management API
#[derive(Debug, Error)]
pub enum DnsError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// DNS API returned an error
    #[error("DNS API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Login failed or the token was rejected twice
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The record already exists with a different address
    #[error("Record conflict: {0}")]
    Conflict(String),
}
