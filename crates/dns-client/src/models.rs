//! DNS API models

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Default record TTL in seconds
pub const DEFAULT_TTL: u32 = 300;

/// Response of `POST /api/auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Record type derived from the address family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    pub fn for_address(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

/// A published host record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecord {
    pub fqdn: String,
    pub address: IpAddr,
    pub zone: String,
    pub ttl: u32,
    pub record_type: RecordType,
}

impl DnsRecord {
    pub fn new(fqdn: &str, address: IpAddr, zone: &str, ttl: u32) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            address,
            zone: zone.to_string(),
            ttl,
            record_type: RecordType::for_address(address),
        }
    }
}
