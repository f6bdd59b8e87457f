//! Address pools
//!
//! A pool is a CIDR network plus the metadata the lifecycle needs (DNS zone,
//! gateway, VLAN). Its usable host range is computed once at registration:
//!
//! - IPv4: network and broadcast excluded, except `/31` (both hosts usable)
//!   and `/32` (the single address).
//! - IPv6: only the subnet-router anycast (network) address is excluded;
//!   `/127` and `/128` keep every address.
//!
//! The gateway, when set, lies inside the host range and is never handed out.

use crate::error::IpamError;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Pool definition as it appears in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSpec {
    /// Unique pool identifier
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Network in CIDR form; host bits must be zero
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// DNS zone hostnames from this pool are published under
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,
}

/// A registered, validated pool
#[derive(Debug, Clone)]
pub struct AddressPool {
    spec: PoolSpec,
    network: IpNetwork,
    gateway: Option<IpAddr>,
    first_host: u128,
    last_host: u128,
}

impl AddressPool {
    /// Validate a definition and compute its host range
    pub fn from_spec(spec: PoolSpec) -> Result<Self, IpamError> {
        if spec.id.trim().is_empty() {
            return Err(IpamError::InvalidPool("pool id must not be empty".to_string()));
        }
        if spec.zone.trim().is_empty() {
            return Err(IpamError::InvalidPool(format!("pool {} has no DNS zone", spec.id)));
        }

        let network: IpNetwork = spec
            .cidr
            .trim()
            .parse()
            .map_err(|e| IpamError::InvalidPool(format!("pool {}: invalid CIDR {}: {}", spec.id, spec.cidr, e)))?;
        if network.ip() != network.network() {
            return Err(IpamError::InvalidPool(format!(
                "pool {}: {} has host bits set (network is {}/{})",
                spec.id,
                spec.cidr,
                network.network(),
                network.prefix()
            )));
        }

        let (first_host, last_host) = host_bounds(&network);

        let gateway = match spec.gateway.as_deref() {
            Some(raw) => {
                let gateway: IpAddr = raw
                    .trim()
                    .parse()
                    .map_err(|_| IpamError::InvalidPool(format!("pool {}: invalid gateway {}", spec.id, raw)))?;
                let value = to_u128(gateway);
                if gateway.is_ipv4() != network.is_ipv4() || value < first_host || value > last_host {
                    return Err(IpamError::InvalidPool(format!(
                        "pool {}: gateway {} is not a usable host of {}",
                        spec.id, gateway, spec.cidr
                    )));
                }
                Some(gateway)
            }
            None => None,
        };

        Ok(Self {
            spec,
            network,
            gateway,
            first_host,
            last_host,
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn zone(&self) -> &str {
        &self.spec.zone
    }

    pub fn network(&self) -> IpNetwork {
        self.network
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    pub fn spec(&self) -> &PoolSpec {
        &self.spec
    }

    pub fn first_host(&self) -> IpAddr {
        from_u128(self.first_host, self.network.is_ipv4())
    }

    pub fn last_host(&self) -> IpAddr {
        from_u128(self.last_host, self.network.is_ipv4())
    }

    /// Number of usable hosts, gateway excluded
    pub fn capacity(&self) -> u128 {
        let hosts = self.last_host - self.first_host + 1;
        if self.gateway.is_some() { hosts - 1 } else { hosts }
    }

    /// Whether `address` lies in the usable host range (gateway included)
    pub fn contains_host(&self, address: IpAddr) -> bool {
        if address.is_ipv4() != self.network.is_ipv4() {
            return false;
        }
        let value = to_u128(address);
        value >= self.first_host && value <= self.last_host
    }

    /// Whether `address` can ever be handed out by this pool
    pub fn is_allocatable(&self, address: IpAddr) -> bool {
        self.contains_host(address) && Some(address) != self.gateway
    }

    /// Reject addresses a caller may not request
    pub(crate) fn check_requestable(&self, address: IpAddr) -> Result<(), IpamError> {
        if !self.contains_host(address) {
            return Err(IpamError::OutOfRange {
                address,
                pool: self.spec.id.clone(),
            });
        }
        if Some(address) == self.gateway {
            return Err(IpamError::Conflict(address));
        }
        Ok(())
    }

    /// Allocatable hosts in ascending order, skipping `taken`
    pub(crate) fn free_hosts<'a>(
        &'a self,
        taken: &'a std::collections::BTreeSet<u128>,
    ) -> impl Iterator<Item = IpAddr> + 'a {
        let gateway = self.gateway.map(to_u128);
        let ipv4 = self.network.is_ipv4();
        // Inclusive range; `last_host` may be u128::MAX for an all-ones IPv6 /128
        (self.first_host..=self.last_host)
            .filter(move |v| !taken.contains(v) && Some(*v) != gateway)
            .map(move |v| from_u128(v, ipv4))
    }
}

fn host_bounds(network: &IpNetwork) -> (u128, u128) {
    match network {
        IpNetwork::V4(net) => {
            let base = u128::from(u32::from(net.network()));
            let broadcast = u128::from(u32::from(net.broadcast()));
            match net.prefix() {
                31 | 32 => (base, broadcast),
                _ => (base + 1, broadcast - 1),
            }
        }
        IpNetwork::V6(net) => {
            let base = u128::from(net.network());
            let last = u128::from(net.broadcast());
            match net.prefix() {
                127 | 128 => (base, last),
                _ => (base + 1, last),
            }
        }
    }
}

pub(crate) fn to_u128(address: IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_u128(value: u128, ipv4: bool) -> IpAddr {
    if ipv4 {
        IpAddr::V4(Ipv4Addr::from(value as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(value))
    }
}

/// Utilisation of one pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolUsage {
    pub pool_id: String,
    pub cidr: String,
    pub zone: String,
    /// Usable hosts, gateway excluded
    pub capacity: u128,
    pub allocated: u64,
    pub reserved: u64,
    pub available: u128,
    /// `(allocated + reserved) / capacity * 100`, 0 for an empty pool
    pub utilization_percent: f64,
}
