//! Allocation engine
//!
//! Hands out the lowest free usable host of a pool. Allocations within one
//! pool are serialised by a per-pool lock that is held only for the
//! scan-and-insert; the store's conditional insert guarantees uniqueness
//! across pools (overlapping pools cannot double-allocate an address).

use crate::allocation::{AddressAllocation, AllocationRequest, AllocationStatus, AvailableAddresses};
use crate::error::{IpamError, StoreError, parse_address};
use crate::pool::{AddressPool, PoolSpec, PoolUsage, to_u128};
use crate::store::AllocationStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
struct PoolEntry {
    pool: Arc<AddressPool>,
    lock: Arc<Mutex<()>>,
}

/// Pool registry plus allocation bookkeeping
pub struct AllocationEngine {
    pools: RwLock<BTreeMap<String, PoolEntry>>,
    store: Arc<dyn AllocationStore>,
}

impl std::fmt::Debug for AllocationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine")
            .field("pools", &self.pool_ids())
            .finish_non_exhaustive()
    }
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn AllocationStore>) -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            store,
        }
    }

    /// Validate and register a pool; ids must be unique
    pub fn register_pool(&self, spec: PoolSpec) -> Result<Arc<AddressPool>, IpamError> {
        let pool = Arc::new(AddressPool::from_spec(spec)?);
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        if pools.contains_key(pool.id()) {
            return Err(IpamError::InvalidPool(format!("duplicate pool id {}", pool.id())));
        }
        for other in pools.values() {
            if other.pool.network().contains(pool.network().network())
                || pool.network().contains(other.pool.network().network())
            {
                warn!(
                    "Pool {} ({}) overlaps pool {} ({})",
                    pool.id(),
                    pool.network(),
                    other.pool.id(),
                    other.pool.network()
                );
            }
        }
        info!(
            "Registered pool {} ({}, zone {}, {} usable hosts)",
            pool.id(),
            pool.network(),
            pool.zone(),
            pool.capacity()
        );
        pools.insert(
            pool.id().to_string(),
            PoolEntry {
                pool: Arc::clone(&pool),
                lock: Arc::new(Mutex::new(())),
            },
        );
        Ok(pool)
    }

    fn entry(&self, pool_id: &str) -> Result<(Arc<AddressPool>, Arc<Mutex<()>>), IpamError> {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        pools
            .get(pool_id)
            .map(|e| (Arc::clone(&e.pool), Arc::clone(&e.lock)))
            .ok_or_else(|| IpamError::PoolNotFound(pool_id.to_string()))
    }

    pub fn pool(&self, pool_id: &str) -> Result<Arc<AddressPool>, IpamError> {
        self.entry(pool_id).map(|(pool, _)| pool)
    }

    pub fn pools(&self) -> Vec<Arc<AddressPool>> {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        pools.values().map(|e| Arc::clone(&e.pool)).collect()
    }

    fn pool_ids(&self) -> Vec<String> {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        pools.keys().cloned().collect()
    }

    /// First registered pool whose usable range contains `address`
    pub fn pool_for_address(&self, address: IpAddr) -> Option<Arc<AddressPool>> {
        self.pools().into_iter().find(|p| p.contains_host(address))
    }

    /// Held addresses inside `pool`'s range, from every pool's records
    async fn taken(&self, pool: &AddressPool) -> Result<BTreeSet<u128>, IpamError> {
        Ok(self
            .store
            .held()
            .await?
            .into_iter()
            .filter(|r| pool.contains_host(r.address))
            .map(|r| to_u128(r.address))
            .collect())
    }

    /// Allocate the preferred address, or the lowest free host of the pool
    #[instrument(skip(self, request))]
    pub async fn allocate(&self, pool_id: &str, request: AllocationRequest) -> Result<AddressAllocation, IpamError> {
        let (pool, lock) = self.entry(pool_id)?;

        let preferred = match request.preferred_address.as_deref() {
            Some(raw) => {
                let address = parse_address(raw)?;
                pool.check_requestable(address)?;
                Some(address)
            }
            None => None,
        };

        let _guard = lock.lock().await;
        let allocation = match preferred {
            Some(address) => {
                let allocation = AddressAllocation::allocated(address, pool.id(), &request);
                self.store.insert(allocation.clone()).await.map_err(|e| match e {
                    StoreError::Conflict(address) => IpamError::Conflict(address),
                    other => IpamError::Store(other),
                })?;
                allocation
            }
            None => loop {
                let taken = self.taken(&pool).await?;
                let address = pool
                    .free_hosts(&taken)
                    .next()
                    .ok_or_else(|| IpamError::PoolExhausted(pool.id().to_string()))?;
                let allocation = AddressAllocation::allocated(address, pool.id(), &request);
                match self.store.insert(allocation.clone()).await {
                    Ok(()) => break allocation,
                    // Taken through an overlapping pool since the scan
                    Err(StoreError::Conflict(address)) => {
                        debug!("Address {} taken concurrently, rescanning", address);
                    }
                    Err(other) => return Err(other.into()),
                }
            },
        };

        info!(
            "Allocated {} from pool {} to {}",
            allocation.address,
            pool.id(),
            allocation.device_ref.as_deref().unwrap_or("unassigned")
        );
        Ok(allocation)
    }

    /// Return an allocated address to its pool
    #[instrument(skip(self))]
    pub async fn release(&self, address: IpAddr) -> Result<AddressAllocation, IpamError> {
        match self.store.clear(address, AllocationStatus::Allocated).await {
            Ok(record) => {
                info!("Released {} back to pool {}", address, record.pool_id);
                Ok(record)
            }
            Err(StoreError::NotHeld(address)) => Err(IpamError::NotAllocated(address)),
            Err(other) => Err(other.into()),
        }
    }

    /// Withhold an address from automatic allocation
    pub async fn reserve(&self, pool_id: &str, address: &str, notes: Option<String>) -> Result<AddressAllocation, IpamError> {
        let (pool, lock) = self.entry(pool_id)?;
        let address = parse_address(address)?;
        pool.check_requestable(address)?;

        let _guard = lock.lock().await;
        let record = AddressAllocation::reserved(address, pool.id(), notes);
        self.store.insert(record.clone()).await.map_err(|e| match e {
            StoreError::Conflict(address) => IpamError::Conflict(address),
            other => IpamError::Store(other),
        })?;
        info!("Reserved {} in pool {}", address, pool.id());
        Ok(record)
    }

    /// Lift a reservation
    pub async fn unreserve(&self, address: IpAddr) -> Result<AddressAllocation, IpamError> {
        match self.store.clear(address, AllocationStatus::Reserved).await {
            Ok(record) => {
                info!("Unreserved {} in pool {}", address, record.pool_id);
                Ok(record)
            }
            Err(StoreError::NotHeld(address)) => Err(IpamError::NotAllocated(address)),
            Err(other) => Err(other.into()),
        }
    }

    /// Current record for `address`, if any
    pub async fn lookup(&self, address: IpAddr) -> Result<Option<AddressAllocation>, IpamError> {
        Ok(self.store.get(address).await?)
    }

    /// Up to `limit` free addresses in ascending order, plus the total free count
    pub async fn available(&self, pool_id: &str, limit: usize) -> Result<AvailableAddresses, IpamError> {
        let pool = self.pool(pool_id)?;
        let taken = self.taken(&pool).await?;
        let addresses = pool.free_hosts(&taken).take(limit).collect();
        let held_allocatable = taken
            .iter()
            .filter(|v| pool.gateway().map(to_u128) != Some(**v))
            .count() as u128;

        Ok(AvailableAddresses {
            pool_id: pool.id().to_string(),
            addresses,
            total_available: pool.capacity().saturating_sub(held_allocatable),
        })
    }

    /// Utilisation report of one pool
    pub async fn usage(&self, pool_id: &str) -> Result<PoolUsage, IpamError> {
        let pool = self.pool(pool_id)?;
        let held: Vec<AddressAllocation> = self
            .store
            .held()
            .await?
            .into_iter()
            .filter(|r| r.pool_id == pool.id())
            .collect();
        let allocated = held.iter().filter(|r| r.status == AllocationStatus::Allocated).count() as u64;
        let reserved = held.iter().filter(|r| r.status == AllocationStatus::Reserved).count() as u64;
        let capacity = pool.capacity();
        let used = u128::from(allocated + reserved);
        let utilization_percent = if capacity == 0 {
            0.0
        } else {
            (used as f64 / capacity as f64 * 10_000.0).round() / 100.0
        };

        Ok(PoolUsage {
            pool_id: pool.id().to_string(),
            cidr: pool.network().to_string(),
            zone: pool.zone().to_string(),
            capacity,
            allocated,
            reserved,
            available: capacity.saturating_sub(used),
            utilization_percent,
        })
    }

    /// Allocated records whose expiry is at or before `now`; nothing is released
    pub async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<AddressAllocation>, IpamError> {
        let mut expired: Vec<AddressAllocation> = self
            .store
            .held()
            .await?
            .into_iter()
            .filter(|r| r.is_expired(now))
            .collect();
        expired.sort_by_key(|r| r.address);
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAllocationStore;
    use chrono::Duration;

    fn engine_with(cidr: &str, gateway: Option<&str>) -> AllocationEngine {
        let engine = AllocationEngine::new(Arc::new(MemoryAllocationStore::new()));
        engine
            .register_pool(PoolSpec {
                id: "lab".to_string(),
                name: Some("Lab".to_string()),
                cidr: cidr.to_string(),
                gateway: gateway.map(str::to_string),
                zone: "range.local".to_string(),
                vlan_id: Some(100),
                description: None,
                dns_servers: Vec::new(),
            })
            .unwrap();
        engine
    }

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn preferred(raw: &str) -> AllocationRequest {
        AllocationRequest {
            preferred_address: Some(raw.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_allocates_in_ascending_order() {
        let engine = engine_with("10.0.0.0/29", None);
        let a = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        let b = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        let c = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        assert_eq!(
            vec![a.address, b.address, c.address],
            vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3")]
        );
    }

    #[tokio::test]
    async fn test_released_address_is_reused_first() {
        let engine = engine_with("10.0.0.0/29", None);
        for _ in 0..3 {
            engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        }
        engine.release(ip("10.0.0.2")).await.unwrap();
        let next = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        assert_eq!(next.address, ip("10.0.0.2"));
    }

    #[tokio::test]
    async fn test_gateway_is_skipped() {
        let engine = engine_with("10.0.0.0/29", Some("10.0.0.1"));
        let first = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        assert_eq!(first.address, ip("10.0.0.2"));
        assert!(matches!(
            engine.allocate("lab", preferred("10.0.0.1")).await,
            Err(IpamError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_preferred_address_rules() {
        let engine = engine_with("10.0.0.0/29", None);
        let taken = engine.allocate("lab", preferred("10.0.0.5")).await.unwrap();
        assert_eq!(taken.address, ip("10.0.0.5"));

        assert!(matches!(engine.allocate("lab", preferred("10.0.0.5")).await, Err(IpamError::Conflict(_))));
        assert!(matches!(engine.allocate("lab", preferred("10.0.0.0")).await, Err(IpamError::OutOfRange { .. })));
        assert!(matches!(engine.allocate("lab", preferred("10.0.0.7")).await, Err(IpamError::OutOfRange { .. })));
        assert!(matches!(engine.allocate("lab", preferred("10.9.0.1")).await, Err(IpamError::OutOfRange { .. })));
        assert!(matches!(engine.allocate("lab", preferred("10.0.0.300")).await, Err(IpamError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_exhaustion_and_release_errors() {
        let engine = engine_with("10.0.0.0/30", None);
        engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        assert!(matches!(
            engine.allocate("lab", AllocationRequest::default()).await,
            Err(IpamError::PoolExhausted(_))
        ));

        engine.release(ip("10.0.0.1")).await.unwrap();
        assert!(matches!(engine.release(ip("10.0.0.1")).await, Err(IpamError::NotAllocated(_))));
        assert!(matches!(
            engine.allocate("nope", AllocationRequest::default()).await,
            Err(IpamError::PoolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reserved_addresses_are_not_allocated_or_released() {
        let engine = engine_with("10.0.0.0/29", None);
        engine.reserve("lab", "10.0.0.1", Some("printer".to_string())).await.unwrap();
        let first = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        assert_eq!(first.address, ip("10.0.0.2"));

        assert!(matches!(engine.release(ip("10.0.0.1")).await, Err(IpamError::NotAllocated(_))));
        engine.unreserve(ip("10.0.0.1")).await.unwrap();
        let next = engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        assert_eq!(next.address, ip("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_available_and_usage() {
        let engine = engine_with("10.0.0.0/29", Some("10.0.0.1"));
        engine.allocate("lab", AllocationRequest::default()).await.unwrap();
        engine.reserve("lab", "10.0.0.4", None).await.unwrap();

        let available = engine.available("lab", 2).await.unwrap();
        assert_eq!(available.addresses, vec![ip("10.0.0.3"), ip("10.0.0.5")]);
        assert_eq!(available.total_available, 3);

        let usage = engine.usage("lab").await.unwrap();
        assert_eq!(usage.capacity, 5);
        assert_eq!(usage.allocated, 1);
        assert_eq!(usage.reserved, 1);
        assert_eq!(usage.available, 3);
        assert_eq!(usage.utilization_percent, 40.0);
    }

    #[tokio::test]
    async fn test_expired_is_read_only() {
        let engine = engine_with("10.0.0.0/29", None);
        let request = AllocationRequest {
            expires_at: Some(Utc::now() - Duration::minutes(1)),
            ..Default::default()
        };
        let stale = engine.allocate("lab", request).await.unwrap();
        engine.allocate("lab", AllocationRequest::default()).await.unwrap();

        let expired = engine.expired(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].address, stale.address);
        let still_held = engine.lookup(stale.address).await.unwrap().unwrap();
        assert_eq!(still_held.status, AllocationStatus::Allocated);
    }

    #[tokio::test]
    async fn test_duplicate_pool_is_rejected() {
        let engine = engine_with("10.0.0.0/29", None);
        let err = engine
            .register_pool(PoolSpec {
                id: "lab".to_string(),
                name: None,
                cidr: "10.1.0.0/29".to_string(),
                gateway: None,
                zone: "other.local".to_string(),
                vlan_id: None,
                description: None,
                dns_servers: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, IpamError::InvalidPool(_)));
        assert_eq!(engine.pool_for_address(ip("10.0.0.3")).unwrap().id(), "lab");
        assert!(engine.pool_for_address(ip("10.0.0.0")).is_none());
    }
}
