//! Service configuration
//!
//! Loaded from a YAML file, then overridden from the environment. Credentials
//! are expected to come from the environment rather than the file:
//!
//! | variable            | overrides               |
//! |---------------------|-------------------------|
//! | `PANOS_URL`         | `firewall.base_url`     |
//! | `PANOS_USERNAME`    | `firewall.username`     |
//! | `PANOS_PASSWORD`    | `firewall.password`     |
//! | `DNS_API_URL`       | `dns_api.base_url`      |
//! | `DNS_API_USERNAME`  | `dns_api.username`      |
//! | `DNS_API_PASSWORD`  | `dns_api.password`      |
//! | `LIFECYCLE_LISTEN`  | `listen`                |

use crate::error::ControllerError;
use ipam_core::{
    CommitPolicy, DEFAULT_MANAGED_NETWORKS, ManagedRanges, OrchestratorConfig, PoolSpec, RouteDefaults, RouteNaming,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub firewall: FirewallConfig,
    pub dns_api: DnsApiConfig,
    #[serde(default)]
    pub route_injection: RouteInjectionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirewallConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_virtual_router")]
    pub virtual_router: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// TTL of published records, seconds
    #[serde(default = "default_dns_ttl")]
    pub ttl: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteInjectionConfig {
    /// Networks that get DNS records and host routes
    #[serde(default = "default_managed_networks")]
    pub managed_networks: Vec<String>,
    #[serde(default)]
    pub route_naming: RouteNaming,
    #[serde(default = "default_next_hop")]
    pub next_hop: String,
    #[serde(default = "default_interface")]
    pub interface: Option<String>,
    #[serde(default = "default_metric")]
    pub metric: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_commit_timeout_secs")]
    pub commit_timeout_secs: u64,
}

impl Default for RouteInjectionConfig {
    fn default() -> Self {
        Self {
            managed_networks: default_managed_networks(),
            route_naming: RouteNaming::default(),
            next_hop: default_next_hop(),
            interface: default_interface(),
            metric: default_metric(),
            poll_interval_secs: default_poll_interval_secs(),
            commit_timeout_secs: default_commit_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Snapshot file; in-memory only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Expire associations after this many seconds; kept until release when unset
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file; in-memory only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_virtual_router() -> String {
    "default".to_string()
}

fn default_dns_ttl() -> u32 {
    dns_client::DEFAULT_TTL
}

fn default_managed_networks() -> Vec<String> {
    DEFAULT_MANAGED_NETWORKS.iter().map(|n| n.to_string()).collect()
}

fn default_next_hop() -> String {
    "172.21.55.20".to_string()
}

fn default_interface() -> Option<String> {
    Some("ethernet1/1".to_string())
}

fn default_metric() -> u32 {
    10
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_commit_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Read `path`, apply environment overrides and validate
    pub async fn load(path: &Path) -> Result<Self, ControllerError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ControllerError::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml(&raw)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ControllerError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Override settings from `lookup` (the process environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, name: &str| {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.listen, "LIFECYCLE_LISTEN");
        set(&mut self.firewall.base_url, "PANOS_URL");
        set(&mut self.dns_api.base_url, "DNS_API_URL");

        let set_opt = |target: &mut Option<String>, name: &str| {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *target = Some(value);
            }
        };
        set_opt(&mut self.firewall.username, "PANOS_USERNAME");
        set_opt(&mut self.firewall.password, "PANOS_PASSWORD");
        set_opt(&mut self.dns_api.username, "DNS_API_USERNAME");
        set_opt(&mut self.dns_api.password, "DNS_API_PASSWORD");
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.firewall.base_url.trim().is_empty() {
            return Err(ControllerError::InvalidConfig(
                "firewall.base_url (or PANOS_URL) is required".to_string(),
            ));
        }
        if self.dns_api.base_url.trim().is_empty() {
            return Err(ControllerError::InvalidConfig(
                "dns_api.base_url (or DNS_API_URL) is required".to_string(),
            ));
        }
        for (value, name) in [
            (&self.firewall.username, "PANOS_USERNAME"),
            (&self.firewall.password, "PANOS_PASSWORD"),
            (&self.dns_api.username, "DNS_API_USERNAME"),
            (&self.dns_api.password, "DNS_API_PASSWORD"),
        ] {
            if value.as_deref().is_none_or(str::is_empty) {
                return Err(ControllerError::InvalidConfig(format!(
                    "{} environment variable is required",
                    name
                )));
            }
        }
        if self.route_injection.next_hop.trim().is_empty() {
            return Err(ControllerError::InvalidConfig(
                "route_injection.next_hop must not be empty".to_string(),
            ));
        }
        if self.route_injection.poll_interval_secs == 0 || self.route_injection.commit_timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "route_injection poll interval and commit timeout must be positive".to_string(),
            ));
        }
        if self.route_injection.poll_interval_secs > self.route_injection.commit_timeout_secs {
            return Err(ControllerError::InvalidConfig(
                "route_injection.poll_interval_secs exceeds commit_timeout_secs".to_string(),
            ));
        }
        if self.cache.ttl_seconds == Some(0) {
            return Err(ControllerError::InvalidConfig(
                "cache.ttl_seconds must be positive when set".to_string(),
            ));
        }
        self.managed_ranges()?;
        Ok(())
    }

    pub fn managed_ranges(&self) -> Result<ManagedRanges, ControllerError> {
        Ok(ManagedRanges::parse(&self.route_injection.managed_networks)?)
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            poll_interval: Duration::from_secs(self.route_injection.poll_interval_secs),
            timeout: Duration::from_secs(self.route_injection.commit_timeout_secs),
        }
    }

    pub fn orchestrator(&self) -> Result<OrchestratorConfig, ControllerError> {
        let route = &self.route_injection;
        Ok(OrchestratorConfig {
            managed: self.managed_ranges()?,
            naming: route.route_naming.clone(),
            route: RouteDefaults {
                virtual_router: self.firewall.virtual_router.clone(),
                next_hop: route.next_hop.clone(),
                interface: route.interface.clone(),
                metric: route.metric,
            },
            dns_ttl: self.dns_api.ttl,
            association_ttl: self.cache.ttl_seconds.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
firewall:
  base_url: https://192.0.2.254
dns_api:
  base_url: http://dns-tool:5000
pools:
  - id: gateway-1
    cidr: 10.100.1.0/24
    gateway: 10.100.1.1
    zone: range.local
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    fn credentials() -> impl Fn(&str) -> Option<String> {
        env(&[
            ("PANOS_USERNAME", "admin"),
            ("PANOS_PASSWORD", "secret"),
            ("DNS_API_USERNAME", "dns"),
            ("DNS_API_PASSWORD", "secret"),
        ])
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert!(config.firewall.verify_tls);
        assert_eq!(config.firewall.virtual_router, "default");
        assert_eq!(config.dns_api.ttl, 300);
        assert_eq!(config.route_injection.next_hop, "172.21.55.20");
        assert_eq!(config.route_injection.interface.as_deref(), Some("ethernet1/1"));
        assert_eq!(config.route_injection.metric, 10);
        assert_eq!(config.route_injection.managed_networks.len(), 4);
        assert_eq!(config.route_injection.route_naming, RouteNaming::default());
        assert_eq!(config.cache.ttl_seconds, None);
        assert_eq!(config.pools[0].id, "gateway-1");

        let policy = config.commit_policy();
        assert_eq!(policy.poll_interval, Duration::from_secs(2));
        assert_eq!(policy.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_credentials_come_from_environment() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        assert!(matches!(config.validate(), Err(ControllerError::InvalidConfig(_))));

        config.apply_env(credentials());
        config.validate().unwrap();
        assert_eq!(config.firewall.username.as_deref(), Some("admin"));
        assert_eq!(config.dns_api.username.as_deref(), Some("dns"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.apply_env(env(&[("PANOS_URL", "https://fw.lab"), ("LIFECYCLE_LISTEN", "127.0.0.1:9000")]));
        assert_eq!(config.firewall.base_url, "https://fw.lab");
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.dns_api.base_url, "http://dns-tool:5000");
    }

    #[test]
    fn test_invalid_managed_network_is_rejected() {
        let yaml = format!(
            "{}route_injection:\n  managed_networks: [\"10.0.0.0/8\", \"not-a-cidr\"]\n",
            MINIMAL.trim_start()
        );
        let mut config = Config::from_yaml(&yaml).unwrap();
        config.apply_env(credentials());
        assert!(matches!(config.validate(), Err(ControllerError::Ipam(_))));
    }

    #[test]
    fn test_orchestrator_settings() {
        let yaml = format!(
            "{}cache:\n  ttl_seconds: 86400\nroute_injection:\n  route_naming:\n    prefix: lab\n  interface: null\n",
            MINIMAL.trim_start()
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let orchestrator = config.orchestrator().unwrap();
        assert_eq!(orchestrator.association_ttl, Some(Duration::from_secs(86400)));
        assert_eq!(orchestrator.naming.prefix, "lab");
        assert_eq!(orchestrator.naming.separator, "_");
        assert_eq!(orchestrator.route.interface, None);
        assert_eq!(orchestrator.dns_ttl, 300);
        assert!(orchestrator.managed.is_managed("10.100.1.2".parse().unwrap()));
    }

    #[test]
    fn test_example_config_parses() {
        let mut config = Config::from_yaml(include_str!("../config.example.yaml")).unwrap();
        config.apply_env(credentials());
        config.validate().unwrap();
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.pools[0].vlan_id, Some(100));
        assert!(!config.firewall.verify_tls);
    }

    #[tokio::test]
    async fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.yaml")).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
