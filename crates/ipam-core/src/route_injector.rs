//! Route injection
//!
//! Stages host routes in the firewall's candidate configuration and commits
//! them. Staging is idempotent: an identical route is left alone, an absent
//! route is not deleted again. Commit-and-wait is serialised per device so
//! two provisioning flows never interleave their commits. A commit activates
//! everything staged at that moment, including other flows' routes; the
//! injector counts submitted commits so callers can tell whether one ran
//! between staging and their own commit.

use panos_client::{CommitJob, GatewayError, NetworkDeviceGateway, StaticRoute, static_route_xpath, wait_for_terminal};
use panos_client::{DEFAULT_COMMIT_TIMEOUT, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Forwarding parameters shared by every injected route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteDefaults {
    #[serde(default = "default_virtual_router")]
    pub virtual_router: String,
    pub next_hop: String,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_metric")]
    pub metric: u32,
}

fn default_virtual_router() -> String {
    "default".to_string()
}

fn default_metric() -> u32 {
    10
}

impl RouteDefaults {
    /// Host route for `address` named `name`
    pub fn host_route(&self, name: &str, address: IpAddr) -> StaticRoute {
        let prefix_len = if address.is_ipv4() { 32 } else { 128 };
        StaticRoute {
            name: name.to_string(),
            destination: format!("{}/{}", address, prefix_len),
            next_hop: self.next_hop.clone(),
            interface: self.interface.clone(),
            metric: self.metric,
        }
    }
}

/// Commit-job polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

/// Result of staging a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChange {
    /// The candidate config was modified
    Staged,
    /// Candidate config already in the requested state
    Unchanged,
}

/// Stages and commits static routes on one device
pub struct RouteInjector {
    gateway: Arc<dyn NetworkDeviceGateway>,
    virtual_router: String,
    policy: CommitPolicy,
    commit_lock: Mutex<()>,
    commits: AtomicU64,
}

impl std::fmt::Debug for RouteInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteInjector")
            .field("device", &self.gateway.device_id())
            .field("virtual_router", &self.virtual_router)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RouteInjector {
    pub fn new(gateway: Arc<dyn NetworkDeviceGateway>, virtual_router: impl Into<String>, policy: CommitPolicy) -> Self {
        Self {
            gateway,
            virtual_router: virtual_router.into(),
            policy,
            commit_lock: Mutex::new(()),
            commits: AtomicU64::new(0),
        }
    }

    pub fn device_id(&self) -> &str {
        self.gateway.device_id()
    }

    pub fn virtual_router(&self) -> &str {
        &self.virtual_router
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Commits accepted by the device through this injector
    pub fn commits_submitted(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    async fn submit_commit(&self) -> Result<CommitJob, GatewayError> {
        let job = self.gateway.commit().await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(job)
    }

    /// Stage `route` unless an identical one is already in the candidate config
    pub async fn inject(&self, route: &StaticRoute) -> Result<RouteChange, GatewayError> {
        let xpath = route.xpath(&self.virtual_router);
        if let Some(existing) = self.gateway.read_change(&xpath).await? {
            match StaticRoute::from_element(&route.name, &existing) {
                Ok(current) if current.same_parameters(route) => {
                    debug!("Route {} already staged on {}", route.name, self.device_id());
                    return Ok(RouteChange::Unchanged);
                }
                Ok(_) => info!("Route {} on {} differs, replacing", route.name, self.device_id()),
                Err(e) => warn!("Route {} on {} unreadable ({}), replacing", route.name, self.device_id(), e),
            }
        }

        self.gateway.submit_change(&xpath, &route.to_element()).await?;
        info!(
            "Staged route {} -> {} via {} on {}",
            route.name,
            route.destination,
            route.next_hop,
            self.device_id()
        );
        Ok(RouteChange::Staged)
    }

    /// Stage removal of route `name`; absent routes are left alone
    pub async fn withdraw(&self, name: &str) -> Result<RouteChange, GatewayError> {
        let xpath = static_route_xpath(&self.virtual_router, name);
        if self.gateway.read_change(&xpath).await?.is_none() {
            debug!("Route {} not present on {}", name, self.device_id());
            return Ok(RouteChange::Unchanged);
        }
        self.gateway.delete_change(&xpath).await?;
        info!("Staged removal of route {} on {}", name, self.device_id());
        Ok(RouteChange::Staged)
    }

    /// Submit a commit without waiting for it
    pub async fn commit(&self) -> Result<CommitJob, GatewayError> {
        let _guard = self.commit_lock.lock().await;
        self.submit_commit().await
    }

    /// Commit and poll the job to a terminal state.
    ///
    /// A job that finishes with an error is returned as `Ok` with
    /// `FinishedError` status; only transport failures and the deadline are
    /// errors.
    pub async fn commit_and_wait(&self) -> Result<CommitJob, GatewayError> {
        let _guard = self.commit_lock.lock().await;
        let job = self.submit_commit().await?;
        if job.is_terminal() {
            return Ok(job);
        }
        debug!("Waiting for commit job {} on {}", job.job_id, self.device_id());
        wait_for_terminal(
            self.gateway.as_ref(),
            job.job_id,
            self.policy.poll_interval,
            self.policy.timeout,
        )
        .await
    }
}
