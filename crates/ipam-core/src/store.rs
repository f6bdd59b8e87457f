//! Allocation store
//!
//! Holds one record per address across all pools. Address uniqueness is
//! enforced here with an atomic check-and-insert, independent of any pool
//! lock held by the caller.

use crate::allocation::{AddressAllocation, AllocationStatus};
use crate::error::StoreError;
use crate::snapshot;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persistence of allocation records
#[async_trait::async_trait]
pub trait AllocationStore: Send + Sync {
    /// Insert a held record; `Conflict` if the address is already held.
    /// A released (`Available`) record for the same address is replaced.
    async fn insert(&self, allocation: AddressAllocation) -> Result<(), StoreError>;

    /// Record for `address`, in any status
    async fn get(&self, address: IpAddr) -> Result<Option<AddressAllocation>, StoreError>;

    /// All allocated and reserved records
    async fn held(&self) -> Result<Vec<AddressAllocation>, StoreError>;

    /// Move a record with status `expected` back to `Available` and return it;
    /// `NotHeld` if there is no such record.
    async fn clear(&self, address: IpAddr, expected: AllocationStatus) -> Result<AddressAllocation, StoreError>;
}

/// In-memory store with an optional JSON snapshot
#[derive(Debug, Default)]
pub struct MemoryAllocationStore {
    records: Mutex<HashMap<IpAddr, AddressAllocation>>,
    snapshot: Option<PathBuf>,
}

impl MemoryAllocationStore {
    /// Volatile store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted to `path`, restored from it if it exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records: Vec<AddressAllocation> = snapshot::load(&path).await?.unwrap_or_default();
        info!("Restored {} allocation records from {}", records.len(), path.display());

        Ok(Self {
            records: Mutex::new(records.into_iter().map(|r| (r.address, r)).collect()),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, records: &HashMap<IpAddr, AddressAllocation>) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot {
            let mut all: Vec<&AddressAllocation> = records.values().collect();
            all.sort_by_key(|r| r.address);
            snapshot::save(path, &all).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AllocationStore for MemoryAllocationStore {
    async fn insert(&self, allocation: AddressAllocation) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if records.get(&allocation.address).is_some_and(|r| r.status.is_held()) {
            return Err(StoreError::Conflict(allocation.address));
        }
        debug!("Storing {:?} record for {}", allocation.status, allocation.address);
        let address = allocation.address;
        let previous = records.insert(address, allocation);
        if let Err(e) = self.persist(&records).await {
            // Keep memory and disk in agreement
            match previous {
                Some(previous) => records.insert(address, previous),
                None => records.remove(&address),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, address: IpAddr) -> Result<Option<AddressAllocation>, StoreError> {
        Ok(self.records.lock().await.get(&address).cloned())
    }

    async fn held(&self) -> Result<Vec<AddressAllocation>, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.status.is_held())
            .cloned()
            .collect())
    }

    async fn clear(&self, address: IpAddr, expected: AllocationStatus) -> Result<AddressAllocation, StoreError> {
        let mut records = self.records.lock().await;
        let record = match records.get_mut(&address) {
            Some(record) if record.status == expected => record,
            _ => return Err(StoreError::NotHeld(address)),
        };
        let before = record.clone();
        record.clear();
        let cleared = record.clone();

        if let Err(e) = self.persist(&records).await {
            records.insert(address, before);
            return Err(e);
        }
        Ok(cleared)
    }
}
