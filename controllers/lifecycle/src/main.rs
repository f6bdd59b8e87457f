//! Lifecycle Controller
//!
//! Allocates addresses from configured pools and, for addresses in the
//! managed ranges, publishes a DNS record and commits a host route on the
//! Palo Alto firewall. Release tears both down again.

mod api;
mod config;
mod controller;
mod error;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Lifecycle Controller");

    let config_path = PathBuf::from(env::var("LIFECYCLE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string()));
    let config = Config::load(&config_path).await?;

    info!("Configuration:");
    info!("  Config file: {}", config_path.display());
    info!("  Listen: {}", config.listen);
    info!("  Firewall: {} (vr {})", config.firewall.base_url, config.firewall.virtual_router);
    info!("  DNS API: {}", config.dns_api.base_url);
    info!("  Managed networks: {}", config.route_injection.managed_networks.join(", "));
    info!("  Pools: {}", config.pools.len());

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
