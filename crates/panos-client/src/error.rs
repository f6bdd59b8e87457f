//! PAN-OS client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a PAN-OS device
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request/response error (connection refused, TLS, timeouts)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The device answered with `status="error"` or a non-2xx HTTP status
    #[error("PAN-OS API error: {0}")]
    Api(String),

    /// The response body was not the XML document we expected
    #[error("Malformed PAN-OS response: {0}")]
    Xml(String),

    /// Key generation failed or the device rejected the API key
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A commit job was polled until the deadline without reaching a terminal state
    #[error("Commit job {job_id} still not finished after {waited:?}")]
    PollTimeout {
        /// Device job identifier
        job_id: u64,
        /// Time spent polling
        waited: Duration,
    },
}

impl From<roxmltree::Error> for GatewayError {
    fn from(err: roxmltree::Error) -> Self {
        GatewayError::Xml(err.to_string())
    }
}
