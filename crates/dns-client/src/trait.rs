//! DnsPublisher trait for mocking
//!
//! Abstracts the DNS management API so the lifecycle can be tested
//! without a running DNS tool.

use crate::error::DnsError;
use std::net::IpAddr;

/// Publishes and removes host records
///
/// Both operations are idempotent: creating an identical record or deleting
/// an absent one succeeds.
#[async_trait::async_trait]
pub trait DnsPublisher: Send + Sync {
    /// Publish `fqdn -> address` in `zone`
    async fn create_record(&self, fqdn: &str, address: IpAddr, zone: &str, ttl: u32) -> Result<(), DnsError>;

    /// Remove the record for `fqdn`
    async fn delete_record(&self, fqdn: &str) -> Result<(), DnsError>;
}
