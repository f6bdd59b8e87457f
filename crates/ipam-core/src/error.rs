//! IPAM and lifecycle errors

use dns_client::DnsError;
use panos_client::GatewayError;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Point of the lifecycle an operation was trying to reach when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AddressReserved,
    DnsPublished,
    RouteInjected,
    Committed,
    Associated,
    RouteWithdrawn,
    WithdrawalCommitted,
    DnsRemoved,
    AssociationRemoved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AddressReserved => "address reservation",
            Stage::DnsPublished => "DNS publication",
            Stage::RouteInjected => "route injection",
            Stage::Committed => "commit",
            Stage::Associated => "association record",
            Stage::RouteWithdrawn => "route withdrawal",
            Stage::WithdrawalCommitted => "withdrawal commit",
            Stage::DnsRemoved => "DNS removal",
            Stage::AssociationRemoved => "association removal",
        };
        f.write_str(name)
    }
}

/// Persistence errors of the allocation store and association cache
#[derive(Debug, Error)]
pub enum StoreError {
    /// The address already has an allocated or reserved record
    #[error("Address {0} is already held")]
    Conflict(IpAddr),

    /// No record with the expected status exists for the address
    #[error("Address {0} is not held with the expected status")]
    NotHeld(IpAddr),

    /// Snapshot file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot file could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the allocation engine and the lifecycle orchestrator
#[derive(Debug, Error)]
pub enum IpamError {
    /// Not a parseable IPv4/IPv6 address
    #[error("Invalid IP address format: {0}")]
    InvalidAddress(String),

    /// Address outside the pool's usable host range
    #[error("Address {address} is outside the usable range of pool {pool}")]
    OutOfRange { address: IpAddr, pool: String },

    /// Address already allocated, reserved or owned by the pool gateway
    #[error("Address {0} is already allocated or reserved")]
    Conflict(IpAddr),

    /// Every usable host of the pool is held
    #[error("No available addresses in pool: {0}")]
    PoolExhausted(String),

    /// Release of an address that is not currently allocated
    #[error("Address {0} is not allocated")]
    NotAllocated(IpAddr),

    /// Unknown pool identifier
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    /// Pool definition rejected at registration
    #[error("Invalid pool definition: {0}")]
    InvalidPool(String),

    /// A downstream system could not be reached or refused the request
    #[error("{stage} failed: {message}")]
    DownstreamUnavailable { stage: Stage, message: String },

    /// Commit job finished with an error
    #[error("Commit job {job_id} failed: {details}")]
    CommitFailed { job_id: u64, details: String },

    /// Commit job did not finish before the deadline
    #[error("Commit job {job_id} did not finish within {waited:?}")]
    CommitTimeout { job_id: u64, waited: Duration },

    /// Undoing earlier steps failed; state may be inconsistent
    #[error("{stage} failed ({cause}) and compensation was incomplete: {}", .failures.join("; "))]
    CompensationFailed {
        stage: Stage,
        #[source]
        cause: Box<IpamError>,
        failures: Vec<String>,
    },

    /// Allocation store or association cache failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IpamError {
    pub(crate) fn dns(stage: Stage, err: &DnsError) -> Self {
        IpamError::DownstreamUnavailable {
            stage,
            message: err.to_string(),
        }
    }

    pub(crate) fn gateway(stage: Stage, err: &GatewayError) -> Self {
        match err {
            GatewayError::PollTimeout { job_id, waited } => IpamError::CommitTimeout {
                job_id: *job_id,
                waited: *waited,
            },
            other => IpamError::DownstreamUnavailable {
                stage,
                message: other.to_string(),
            },
        }
    }
}

/// Parse a textual address
pub fn parse_address(raw: &str) -> Result<IpAddr, IpamError> {
    raw.trim()
        .parse()
        .map_err(|_| IpamError::InvalidAddress(raw.to_string()))
}
