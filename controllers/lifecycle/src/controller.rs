//! Main controller implementation.
//!
//! Builds the firewall and DNS clients, the allocation store, association
//! cache and orchestrator from configuration, then serves the HTTP API until
//! interrupted.

use crate::api;
use crate::config::Config;
use crate::error::ControllerError;
use chrono::Utc;
use dns_client::DnsApiClient;
use ipam_core::{
    AllocationEngine, AllocationStore, AssociationCache, LifecycleOrchestrator, MemoryAllocationStore,
    MemoryAssociationCache, RouteInjector,
};
use panos_client::PanOsClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Lifecycle service: wired orchestrator plus its listen address
#[derive(Debug)]
pub struct Controller {
    listen: String,
    orchestrator: Arc<LifecycleOrchestrator>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Lifecycle Controller");

        let firewall = PanOsClient::new(
            config.firewall.base_url.clone(),
            config.firewall.username.clone().unwrap_or_default(),
            config.firewall.password.clone().unwrap_or_default(),
            config.firewall.verify_tls,
            Duration::from_secs(config.firewall.timeout_secs),
        )?;
        info!("Validating firewall credentials...");
        firewall.authenticate().await.map_err(|e| {
            error!("Failed to obtain a PAN-OS API key: {}", e);
            error!("Please ensure PANOS_USERNAME/PANOS_PASSWORD are correct and {} is reachable", config.firewall.base_url);
            ControllerError::Gateway(e)
        })?;

        let dns = DnsApiClient::new(
            config.dns_api.base_url.clone(),
            config.dns_api.username.clone().unwrap_or_default(),
            config.dns_api.password.clone().unwrap_or_default(),
            Duration::from_secs(config.dns_api.timeout_secs),
        )?;
        info!("Validating DNS API credentials...");
        dns.login().await.map_err(|e| {
            error!("Failed to log in to the DNS API: {}", e);
            error!("Please ensure DNS_API_USERNAME/DNS_API_PASSWORD are correct and {} is reachable", dns.base_url());
            ControllerError::Dns(e)
        })?;

        let store: Arc<dyn AllocationStore> = match &config.store.path {
            Some(path) => Arc::new(MemoryAllocationStore::open(path).await?),
            None => {
                warn!("No store.path configured, allocations are lost on restart");
                Arc::new(MemoryAllocationStore::new())
            }
        };
        let cache: Arc<dyn AssociationCache> = match &config.cache.path {
            Some(path) => Arc::new(MemoryAssociationCache::open(path).await?),
            None => {
                warn!("No cache.path configured, associations are lost on restart");
                Arc::new(MemoryAssociationCache::new())
            }
        };

        let engine = AllocationEngine::new(store);
        for pool in &config.pools {
            engine.register_pool(pool.clone())?;
        }
        if config.pools.is_empty() {
            warn!("No pools configured, every allocation will fail with PoolNotFound");
        }

        let expired = engine.expired(Utc::now()).await?;
        if !expired.is_empty() {
            warn!(
                "{} allocations are past their expiry and still held (they are not reclaimed automatically)",
                expired.len()
            );
        }

        let routes = RouteInjector::new(Arc::new(firewall), config.firewall.virtual_router.clone(), config.commit_policy());
        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(engine),
            Arc::new(dns),
            Arc::new(routes),
            cache,
            config.orchestrator()?,
        );

        Ok(Self {
            listen: config.listen,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Serve the HTTP API until Ctrl-C
    pub async fn run(self) -> Result<(), ControllerError> {
        let app = api::router(Arc::clone(&self.orchestrator));
        let listener = tokio::net::TcpListener::bind(&self.listen).await?;
        info!("Lifecycle API listening on {}", listener.local_addr()?);

        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        info!("Lifecycle Controller stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining in-flight requests"),
        Err(e) => {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
