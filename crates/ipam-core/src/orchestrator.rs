//! Address lifecycle orchestration
//!
//! Provisioning runs `Requested -> AddressReserved -> DnsPublished ->
//! RouteInjected -> Committed -> Associated`. Addresses outside the managed
//! ranges stop after `AddressReserved`. When a step fails, every earlier step
//! is undone in reverse order before the error is returned:
//!
//! | failed step     | undo                                                      |
//! |-----------------|-----------------------------------------------------------|
//! | DNS publish     | release address                                           |
//! | route injection | delete DNS, release address                               |
//! | commit failed   | withdraw staged route, delete DNS, release address        |
//! | commit timeout  | withdraw route + corrective commit, delete DNS, release   |
//!
//! A timed-out commit may still land on the device, so the address is only
//! returned to the pool once a corrective commit confirms the route is gone.
//! The same applies to a failed commit when another flow committed after this
//! route was staged: that commit may have activated it.
//! Failing to record the association after a successful commit does not undo
//! anything; the outcome reports the association as orphaned instead.

use crate::allocation::{AddressAllocation, AllocationRequest};
use crate::association::{Association, AssociationCache, AssociationStatus};
use crate::engine::AllocationEngine;
use crate::error::{IpamError, Stage, parse_address};
use crate::managed::ManagedRanges;
use crate::naming::{self, RouteNaming};
use crate::route_injector::{RouteDefaults, RouteInjector};
use chrono::{DateTime, Utc};
use dns_client::DnsPublisher;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub managed: ManagedRanges,
    pub naming: RouteNaming,
    pub route: RouteDefaults,
    /// TTL of published DNS records, seconds
    pub dns_ttl: u32,
    /// Housekeeping TTL of association entries; `None` keeps them until release
    pub association_ttl: Option<Duration>,
}

/// Provisioning request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub pool_id: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub device_ref: Option<String>,
    #[serde(default)]
    pub preferred_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// What happened to the route/DNS side of a provisioned address
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssociationState {
    /// Route committed, DNS published and association recorded
    Recorded { key: String },
    /// Address outside the managed ranges; nothing published
    Skipped,
    /// Route committed and DNS published, but the association could not be
    /// stored; release will not find it and the route must be withdrawn by key
    Orphaned { key: String, reason: String },
}

/// Result of a successful provisioning
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutcome {
    pub allocation: AddressAllocation,
    pub fqdn: String,
    pub association: AssociationState,
}

/// Result of a release
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub address: IpAddr,
    pub fqdn: String,
    /// A cached association was torn down
    pub association_removed: bool,
    /// The address went from allocated to available (false if it already was)
    pub address_released: bool,
}

/// Steps to undo after a failed provisioning step
struct Undo<'a> {
    pool: &'a str,
    address: IpAddr,
    fqdn: Option<&'a str>,
    route: Option<&'a str>,
    corrective_commit: bool,
}

/// Coordinates allocation, DNS, firewall routes and the association cache
pub struct LifecycleOrchestrator {
    engine: Arc<AllocationEngine>,
    dns: Arc<dyn DnsPublisher>,
    routes: Arc<RouteInjector>,
    cache: Arc<dyn AssociationCache>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("engine", &self.engine)
            .field("routes", &self.routes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LifecycleOrchestrator {
    pub fn new(
        engine: Arc<AllocationEngine>,
        dns: Arc<dyn DnsPublisher>,
        routes: Arc<RouteInjector>,
        cache: Arc<dyn AssociationCache>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            dns,
            routes,
            cache,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<AllocationEngine> {
        &self.engine
    }

    pub fn is_managed(&self, address: IpAddr) -> bool {
        self.config.managed.is_managed(address)
    }

    pub fn association_key(&self, fqdn: &str, address: IpAddr) -> String {
        self.config.naming.association_key(fqdn, address)
    }

    /// Allocate an address and, for managed ranges, publish DNS and commit a host route
    #[instrument(skip(self, request), fields(pool = %request.pool_id))]
    pub async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionOutcome, IpamError> {
        // 1. Reserve the address
        let pool = self.engine.pool(&request.pool_id)?;
        let allocation = self
            .engine
            .allocate(
                pool.id(),
                AllocationRequest {
                    device_ref: request.device_ref.clone(),
                    preferred_address: request.preferred_address.clone(),
                    notes: request.notes.clone(),
                    expires_at: request.expires_at,
                },
            )
            .await?;
        let address = allocation.address;
        let fqdn = naming::fqdn_for(request.hostname.as_deref(), address, pool.zone());

        if !self.is_managed(address) {
            info!("{} ({}) is outside the managed ranges, skipping DNS and route injection", address, fqdn);
            return Ok(ProvisionOutcome {
                allocation,
                fqdn,
                association: AssociationState::Skipped,
            });
        }
        let key = self.association_key(&fqdn, address);

        // 2. Publish DNS
        if let Err(e) = self.dns.create_record(&fqdn, address, pool.zone(), self.config.dns_ttl).await {
            let failure = IpamError::dns(Stage::DnsPublished, &e);
            return Err(self
                .compensate(
                    Stage::DnsPublished,
                    failure,
                    Undo {
                        pool: pool.id(),
                        address,
                        fqdn: None,
                        route: None,
                        corrective_commit: false,
                    },
                )
                .await);
        }

        // 3. Stage the host route
        let commits_before = self.routes.commits_submitted();
        let route = self.config.route.host_route(&key, address);
        if let Err(e) = self.routes.inject(&route).await {
            let failure = IpamError::gateway(Stage::RouteInjected, &e);
            return Err(self
                .compensate(
                    Stage::RouteInjected,
                    failure,
                    Undo {
                        pool: pool.id(),
                        address,
                        fqdn: Some(&fqdn),
                        route: None,
                        corrective_commit: false,
                    },
                )
                .await);
        }

        // 4. Commit and wait for the job
        let commit_failure = match self.routes.commit_and_wait().await {
            Ok(job) if job.succeeded() => None,
            Ok(job) => {
                // Ours plus any other flow's commit since staging
                let interleaved = self.routes.commits_submitted() > commits_before + 1;
                if interleaved {
                    warn!("Another commit ran while {} was staged; route may be active", key);
                }
                Some((
                    IpamError::CommitFailed {
                        job_id: job.job_id,
                        details: job.details,
                    },
                    interleaved,
                ))
            }
            // Timed out or lost contact mid-commit: the device state is unknown
            Err(e) => Some((IpamError::gateway(Stage::Committed, &e), true)),
        };
        if let Some((failure, corrective_commit)) = commit_failure {
            return Err(self
                .compensate(
                    Stage::Committed,
                    failure,
                    Undo {
                        pool: pool.id(),
                        address,
                        fqdn: Some(&fqdn),
                        route: Some(&key),
                        corrective_commit,
                    },
                )
                .await);
        }

        // 5. Record the association
        let association = Association {
            key: key.clone(),
            fqdn: fqdn.clone(),
            address,
            zone: pool.zone().to_string(),
            device: self.routes.device_id().to_string(),
            virtual_router: self.routes.virtual_router().to_string(),
            created_at: Utc::now(),
            status: AssociationStatus::Active,
        };
        let state = match self.cache.put(&key, association, self.config.association_ttl).await {
            Ok(()) => AssociationState::Recorded { key },
            Err(e) => {
                error!(
                    "Orphaned association: route {} for {} ({}, pool {}) is committed on {} but could not be recorded: {}",
                    key,
                    fqdn,
                    address,
                    pool.id(),
                    self.routes.device_id(),
                    e
                );
                AssociationState::Orphaned {
                    key,
                    reason: e.to_string(),
                }
            }
        };

        info!("Provisioned {} as {} in pool {}", address, fqdn, pool.id());
        Ok(ProvisionOutcome {
            allocation,
            fqdn,
            association: state,
        })
    }

    /// Undo earlier steps in reverse order; never returns early
    async fn compensate(&self, stage: Stage, failure: IpamError, undo: Undo<'_>) -> IpamError {
        warn!("{} failed for {}: {}; compensating", stage, undo.address, failure);
        let mut failures = Vec::new();
        let mut route_state_unknown = false;

        if let Some(name) = undo.route {
            match self.routes.withdraw(name).await {
                Ok(_) if undo.corrective_commit => match self.routes.commit_and_wait().await {
                    Ok(job) if job.succeeded() => {
                        info!("Corrective commit {} removed route {}", job.job_id, name);
                    }
                    Ok(job) => {
                        failures.push(format!(
                            "corrective commit {} on {} failed: {}",
                            job.job_id,
                            self.routes.device_id(),
                            job.details
                        ));
                        route_state_unknown = true;
                    }
                    Err(e) => {
                        failures.push(format!("corrective commit on {}: {}", self.routes.device_id(), e));
                        route_state_unknown = true;
                    }
                },
                Ok(_) => {}
                Err(e) => {
                    // A staged route left behind goes live with the next commit
                    failures.push(format!("withdraw route {} on {}: {}", name, self.routes.device_id(), e));
                    route_state_unknown = true;
                }
            }
        }

        if let Some(fqdn) = undo.fqdn {
            if let Err(e) = self.dns.delete_record(fqdn).await {
                failures.push(format!("delete DNS record {}: {}", fqdn, e));
            }
        }

        if route_state_unknown {
            failures.push(format!(
                "address {} kept allocated while its route on {} may still be active",
                undo.address,
                self.routes.device_id()
            ));
        } else if let Err(e) = self.engine.release(undo.address).await {
            failures.push(format!("release address {}: {}", undo.address, e));
        }

        if failures.is_empty() {
            info!("Compensation after failed {} completed for {}", stage, undo.address);
            failure
        } else {
            error!(
                "Compensation after failed {} incomplete: pool={} address={} fqdn={} key={}: {}",
                stage,
                undo.pool,
                undo.address,
                undo.fqdn.unwrap_or("-"),
                undo.route.unwrap_or("-"),
                failures.join("; ")
            );
            IpamError::CompensationFailed {
                stage,
                cause: Box::new(failure),
                failures,
            }
        }
    }

    /// Tear down the route/DNS side of an address and return it to its pool.
    ///
    /// Idempotent: a missing association is skipped and an address that is no
    /// longer allocated counts as released. On a downstream failure nothing is
    /// released and the association is kept, so the call can be retried.
    #[instrument(skip(self))]
    pub async fn release(&self, address: &str, hostname: Option<&str>) -> Result<ReleaseOutcome, IpamError> {
        let address = parse_address(address)?;
        let pool = self
            .engine
            .pool_for_address(address)
            .ok_or_else(|| IpamError::OutOfRange {
                address,
                pool: "any registered pool".to_string(),
            })?;
        let mut fqdn = naming::fqdn_for(hostname, address, pool.zone());

        // Look up by address: the caller's hostname may not be the one provisioned
        let associations = self.cache.for_address(address).await?;
        if associations.is_empty() {
            if self.is_managed(address) {
                info!("No association for {}, nothing to withdraw", address);
            } else {
                debug!("{} is outside the managed ranges, releasing address only", address);
            }
        }
        for association in &associations {
            if hostname.is_some() && association.fqdn != fqdn {
                warn!(
                    "{} was provisioned as {}, not {}; withdrawing {}",
                    address, association.fqdn, fqdn, association.key
                );
            }
            // Stops before the address is freed while a route may be live
            self.teardown(association).await?;
        }
        let association_removed = !associations.is_empty();
        if let Some(association) = associations.into_iter().next() {
            fqdn = association.fqdn;
        }

        let address_released = match self.engine.release(address).await {
            Ok(_) => true,
            Err(IpamError::NotAllocated(_)) => {
                info!("{} was not allocated, nothing to release", address);
                false
            }
            Err(e) => return Err(e),
        };

        Ok(ReleaseOutcome {
            address,
            fqdn,
            association_removed,
            address_released,
        })
    }

    /// Withdraw and forget an association by key without touching the allocation
    pub async fn withdraw_association(&self, key: &str) -> Result<Option<Association>, IpamError> {
        match self.cache.get(key).await? {
            Some(association) => {
                self.teardown(&association).await?;
                Ok(Some(association))
            }
            None => Ok(None),
        }
    }

    pub async fn associations(&self) -> Result<Vec<Association>, IpamError> {
        Ok(self.cache.list().await?)
    }

    /// Withdraw route, commit, remove DNS, then drop the cache entry
    async fn teardown(&self, association: &Association) -> Result<(), IpamError> {
        if association.device != self.routes.device_id() {
            warn!(
                "Association {} was committed on {}, withdrawing on {}",
                association.key,
                association.device,
                self.routes.device_id()
            );
        }

        self.routes
            .withdraw(&association.key)
            .await
            .map_err(|e| IpamError::gateway(Stage::RouteWithdrawn, &e))?;

        match self.routes.commit_and_wait().await {
            Ok(job) if job.succeeded() => {}
            Ok(job) => {
                return Err(IpamError::CommitFailed {
                    job_id: job.job_id,
                    details: job.details,
                });
            }
            Err(e) => return Err(IpamError::gateway(Stage::WithdrawalCommitted, &e)),
        }

        self.dns
            .delete_record(&association.fqdn)
            .await
            .map_err(|e| IpamError::dns(Stage::DnsRemoved, &e))?;

        self.cache.delete(&association.key).await?;
        info!(
            "Withdrew route {} and DNS record {} for {}",
            association.key, association.fqdn, association.address
        );
        Ok(())
    }
}
