//! Controller-specific error types.
//!
//! Start-up failures of the lifecycle service. Request-time failures are
//! `IpamError`s and are mapped to HTTP responses in `api`.

use dns_client::DnsError;
use ipam_core::{IpamError, StoreError};
use panos_client::GatewayError;
use thiserror::Error;

/// Errors that can occur while starting or running the Lifecycle Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid YAML for the expected layout
    #[error("Configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Firewall API error
    #[error("Firewall error: {0}")]
    Gateway(#[from] GatewayError),

    /// DNS API error
    #[error("DNS API error: {0}")]
    Dns(#[from] DnsError),

    /// Pool registration or other IPAM error
    #[error("IPAM error: {0}")]
    Ipam(#[from] IpamError),

    /// Allocation store or association cache could not be opened
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Listener or file IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
