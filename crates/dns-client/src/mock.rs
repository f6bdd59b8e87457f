//! Mock DNS publisher for unit testing

use crate::dns_trait::DnsPublisher;
use crate::error::DnsError;
use crate::models::DnsRecord;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Mock DnsPublisher for testing
///
/// Stores records in memory keyed by FQDN. Failures can be switched on per
/// operation to exercise compensation paths.
#[derive(Debug, Clone, Default)]
pub struct MockDnsPublisher {
    records: Arc<Mutex<BTreeMap<String, DnsRecord>>>,
    fail_create: Arc<Mutex<Option<String>>>,
    fail_delete: Arc<Mutex<Option<String>>>,
    deletes: Arc<Mutex<u32>>,
}

impl MockDnsPublisher {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_record` fail with `message` (None to heal)
    pub fn set_fail_create(&self, message: Option<&str>) {
        *self.fail_create.lock().unwrap() = message.map(str::to_string);
    }

    /// Make `delete_record` fail with `message` (None to heal)
    pub fn set_fail_delete(&self, message: Option<&str>) {
        *self.fail_delete.lock().unwrap() = message.map(str::to_string);
    }

    /// Published record for `fqdn`
    pub fn record(&self, fqdn: &str) -> Option<DnsRecord> {
        self.records.lock().unwrap().get(fqdn).cloned()
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether no record is published
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `delete_record` calls
    pub fn delete_count(&self) -> u32 {
        *self.deletes.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl DnsPublisher for MockDnsPublisher {
    async fn create_record(&self, fqdn: &str, address: IpAddr, zone: &str, ttl: u32) -> Result<(), DnsError> {
        if let Some(message) = self.fail_create.lock().unwrap().clone() {
            return Err(DnsError::Api(message));
        }
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.get(fqdn) {
            if existing.address != address {
                return Err(DnsError::Conflict(format!("{} already points at {}", fqdn, existing.address)));
            }
        }
        records.insert(fqdn.to_string(), DnsRecord::new(fqdn, address, zone, ttl));
        Ok(())
    }

    async fn delete_record(&self, fqdn: &str) -> Result<(), DnsError> {
        if let Some(message) = self.fail_delete.lock().unwrap().clone() {
            return Err(DnsError::Api(message));
        }
        self.records.lock().unwrap().remove(fqdn);
        *self.deletes.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_idempotent_for_same_address() {
        let dns = MockDnsPublisher::new();
        let address: IpAddr = "10.1.2.3".parse().unwrap();
        dns.create_record("web.range.local", address, "range.local", 300).await.unwrap();
        dns.create_record("web.range.local", address, "range.local", 300).await.unwrap();
        assert_eq!(dns.len(), 1);

        let other: IpAddr = "10.1.2.4".parse().unwrap();
        let err = dns.create_record("web.range.local", other, "range.local", 300).await.unwrap_err();
        assert!(matches!(err, DnsError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_absent_record_succeeds() {
        let dns = MockDnsPublisher::new();
        dns.delete_record("missing.range.local").await.unwrap();
        assert!(dns.is_empty());
    }
}
