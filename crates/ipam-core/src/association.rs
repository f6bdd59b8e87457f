//! Association cache
//!
//! Records which FQDN/address pairs currently have a committed firewall route
//! and a published DNS record, keyed by the association key. An entry exists
//! only after the commit that made the route effective finished successfully.
//!
//! An optional TTL is housekeeping only: once an entry expires, releasing its
//! address no longer finds the route to withdraw.

use crate::error::StoreError;
use crate::snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssociationStatus {
    #[default]
    Active,
}

/// A committed route + DNS record for one address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Association {
    pub key: String,
    pub fqdn: String,
    pub address: IpAddr,
    pub zone: String,
    /// Firewall the route was committed on
    pub device: String,
    /// Virtual router holding the route
    pub virtual_router: String,
    pub created_at: DateTime<Utc>,
    pub status: AssociationStatus,
}

/// Storage of associations
#[async_trait::async_trait]
pub trait AssociationCache: Send + Sync {
    async fn put(&self, key: &str, association: Association, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<Association>, StoreError>;

    /// Removing an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All live associations, ordered by key
    async fn list(&self) -> Result<Vec<Association>, StoreError>;

    /// Live associations for `address`, whatever key they were stored under
    async fn for_address(&self, address: IpAddr) -> Result<Vec<Association>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|a| a.address == address)
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAssociation {
    association: Association,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl CachedAssociation {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory association cache with an optional JSON snapshot
#[derive(Debug, Default)]
pub struct MemoryAssociationCache {
    entries: Mutex<HashMap<String, CachedAssociation>>,
    snapshot: Option<PathBuf>,
}

impl MemoryAssociationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache persisted to `path`, restored from it if it exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries: Vec<CachedAssociation> = snapshot::load(&path).await?.unwrap_or_default();
        info!("Restored {} associations from {}", entries.len(), path.display());

        Ok(Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|e| (e.association.key.clone(), e))
                    .collect(),
            ),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, entries: &HashMap<String, CachedAssociation>) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot {
            let mut all: Vec<&CachedAssociation> = entries.values().collect();
            all.sort_by(|a, b| a.association.key.cmp(&b.association.key));
            snapshot::save(path, &all).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AssociationCache for MemoryAssociationCache {
    async fn put(&self, key: &str, association: Association, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(
            key.to_string(),
            CachedAssociation {
                association,
                expires_at,
            },
        );
        if let Err(e) = self.persist(&entries).await {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        debug!("Cached association {}", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Association>, StoreError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let live = match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.association.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if live.is_none() {
            debug!("Association {} expired, dropping", key);
            entries.remove(key);
            self.persist(&entries).await?;
        }
        Ok(live)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if let Some(removed) = entries.remove(key) {
            if let Err(e) = self.persist(&entries).await {
                entries.insert(key.to_string(), removed);
                return Err(e);
            }
            debug!("Removed association {}", key);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Association>, StoreError> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        let mut live: Vec<Association> = entries
            .values()
            .filter(|e| e.is_live(now))
            .map(|e| e.association.clone())
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(live)
    }
}
