//! IPAM core
//!
//! Address pools, first-free allocation and the lifecycle that surrounds an
//! address on managed networks: a DNS record, a host route committed on the
//! firewall, and the association that ties the two together so release can
//! take them down again.
//!
//! # Example
//!
//! ```no_run
//! use ipam_core::{AllocationEngine, AllocationRequest, MemoryAllocationStore, PoolSpec};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AllocationEngine::new(Arc::new(MemoryAllocationStore::new()));
//! engine.register_pool(PoolSpec {
//!     id: "lab".to_string(),
//!     name: None,
//!     cidr: "10.100.1.0/24".to_string(),
//!     gateway: Some("10.100.1.1".to_string()),
//!     zone: "lab.local".to_string(),
//!     vlan_id: None,
//!     description: None,
//!     dns_servers: Vec::new(),
//! })?;
//!
//! let allocation = engine.allocate("lab", AllocationRequest::default()).await?;
//! assert_eq!(allocation.address.to_string(), "10.100.1.2");
//! # Ok(())
//! # }
//! ```

pub mod allocation;
pub mod association;
pub mod engine;
pub mod error;
pub mod managed;
pub mod naming;
pub mod orchestrator;
pub mod pool;
pub mod route_injector;
mod snapshot;
pub mod store;

pub use allocation::{AddressAllocation, AllocationRequest, AllocationStatus, AvailableAddresses};
pub use association::{Association, AssociationCache, AssociationStatus, MemoryAssociationCache};
pub use engine::AllocationEngine;
pub use error::{IpamError, Stage, StoreError, parse_address};
pub use managed::{DEFAULT_MANAGED_NETWORKS, ManagedRanges};
pub use naming::{MAX_KEY_LEN, RouteNaming};
pub use orchestrator::{
    AssociationState, LifecycleOrchestrator, OrchestratorConfig, ProvisionOutcome, ProvisionRequest, ReleaseOutcome,
};
pub use pool::{AddressPool, PoolSpec, PoolUsage};
pub use route_injector::{CommitPolicy, RouteChange, RouteDefaults, RouteInjector};
pub use store::{AllocationStore, MemoryAllocationStore};
