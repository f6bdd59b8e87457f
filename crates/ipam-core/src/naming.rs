//! Hostnames, FQDNs and association keys
//!
//! The association key doubles as the static-route entry name on the
//! firewall, so it has to survive PAN-OS name rules: at most 63 characters,
//! letters, digits and `_`. Sanitising alone is lossy (`a-b` and `a.b` collide),
//! so the key ends in a short digest of the canonical `fqdn|address` pair.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Longest entry name PAN-OS accepts
pub const MAX_KEY_LEN: usize = 63;

/// Hex characters of the digest suffix
const DIGEST_CHARS: usize = 8;

/// Association key / route name layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouteNaming {
    pub prefix: String,
    pub separator: String,
}

impl Default for RouteNaming {
    fn default() -> Self {
        Self {
            prefix: "dns".to_string(),
            separator: "_".to_string(),
        }
    }
}

impl RouteNaming {
    /// Deterministic key for an `(fqdn, address)` pair
    ///
    /// `prefix SEP fqdn SEP address SEP digest`, with the readable part cut
    /// short when the whole would exceed [`MAX_KEY_LEN`].
    pub fn association_key(&self, fqdn: &str, address: IpAddr) -> String {
        let fqdn = canonical_fqdn(fqdn);
        let digest = Sha256::digest(format!("{}|{}", fqdn, address).as_bytes());
        let suffix: String = digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .chars()
            .take(DIGEST_CHARS)
            .collect();

        let sep = &self.separator;
        let readable = format!(
            "{}{}{}{}{}",
            sanitize(&self.prefix),
            sep,
            sanitize(&fqdn),
            sep,
            sanitize(&address.to_string())
        );
        let budget = MAX_KEY_LEN.saturating_sub(sep.chars().count() + DIGEST_CHARS);
        let readable: String = readable.chars().take(budget).collect();

        format!("{}{}{}", readable, sep, suffix)
    }
}

/// Lowercase, no trailing dot
pub fn canonical_fqdn(fqdn: &str) -> String {
    fqdn.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Default host label for an address without a hostname: `ip-10-1-2-3`
pub fn default_host_label(address: IpAddr) -> String {
    let body = match address {
        IpAddr::V4(v4) => v4.to_string().replace('.', "-"),
        IpAddr::V6(v6) => v6.to_string().replace(':', "-"),
    };
    format!("ip-{}", body)
}

/// FQDN for `hostname` in `zone`
///
/// A hostname that already ends in the zone is taken as-is; any other name is
/// treated as a label under the zone.
pub fn fqdn_for(hostname: Option<&str>, address: IpAddr, zone: &str) -> String {
    let zone = canonical_fqdn(zone);
    let host = match hostname.map(canonical_fqdn).filter(|h| !h.is_empty()) {
        Some(host) => host,
        None => default_host_label(address),
    };
    if host == zone || host.ends_with(&format!(".{}", zone)) {
        host
    } else {
        format!("{}.{}", host, zone)
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn test_key_is_deterministic_and_readable() {
        let naming = RouteNaming::default();
        let a = naming.association_key("web01.range.local", ip("10.1.2.3"));
        let b = naming.association_key("WEB01.range.local.", ip("10.1.2.3"));
        assert_eq!(a, b, "case and trailing dot must not change the key");
        assert!(a.starts_with("dns_web01_range_local_10_1_2_3_"), "got {}", a);
        assert_eq!(a.len(), "dns_web01_range_local_10_1_2_3_".len() + 8);
    }

    #[test]
    fn test_sanitising_collisions_are_disambiguated() {
        let naming = RouteNaming::default();
        let dashed = naming.association_key("a-b.range.local", ip("10.1.2.3"));
        let dotted = naming.association_key("a.b.range.local", ip("10.1.2.3"));
        assert_ne!(dashed, dotted);
    }

    #[test]
    fn test_key_respects_length_limit() {
        let naming = RouteNaming::default();
        let long = format!("{}.range.local", "x".repeat(80));
        let key = naming.association_key(&long, ip("2001:db8::1234"));
        assert_eq!(key.chars().count(), MAX_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_custom_prefix_and_separator() {
        let naming = RouteNaming {
            prefix: "range".to_string(),
            separator: "-".to_string(),
        };
        let key = naming.association_key("db.lab", ip("10.0.0.2"));
        assert!(key.starts_with("range-db_lab-10_0_0_2-"), "got {}", key);
    }

    #[test]
    fn test_fqdn_for() {
        assert_eq!(fqdn_for(Some("web01"), ip("10.1.2.3"), "range.local"), "web01.range.local");
        assert_eq!(
            fqdn_for(Some("web01.range.local"), ip("10.1.2.3"), "range.local"),
            "web01.range.local"
        );
        assert_eq!(fqdn_for(None, ip("10.1.2.3"), "range.local"), "ip-10-1-2-3.range.local");
        assert_eq!(fqdn_for(Some(" "), ip("10.1.2.3"), "range.local"), "ip-10-1-2-3.range.local");
    }
}
