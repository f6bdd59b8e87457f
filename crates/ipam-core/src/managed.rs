//! Managed address ranges
//!
//! Only addresses inside these networks get DNS records and firewall routes;
//! anything else is allocated and released without downstream side effects.

use crate::error::IpamError;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Networks the default configuration manages
pub const DEFAULT_MANAGED_NETWORKS: [&str; 4] = ["10.0.0.0/8", "172.20.0.0/16", "172.21.0.0/16", "192.168.0.0/16"];

/// Set of networks whose addresses get the full lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedRanges {
    networks: Vec<IpNetwork>,
}

impl ManagedRanges {
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    /// Parse CIDR strings; host bits are tolerated and masked off
    pub fn parse<I, S>(cidrs: I) -> Result<Self, IpamError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = cidrs
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref().trim();
                raw.parse::<IpNetwork>()
                    .map_err(|e| IpamError::InvalidPool(format!("managed network {}: {}", raw, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn is_managed(&self, address: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(address))
    }

    pub fn networks(&self) -> &[IpNetwork] {
        &self.networks
    }
}
