//! PAN-OS XML API Client
//!
//! Stages configuration changes on a Palo Alto firewall, commits them and
//! follows the resulting commit job until it reaches a terminal state.
//!
//! # Example
//!
//! ```no_run
//! use panos_client::{NetworkDeviceGateway, PanOsClient, StaticRoute, wait_for_terminal};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PanOsClient::new(
//!     "https://192.0.2.254".to_string(),
//!     "admin".to_string(),
//!     "secret".to_string(),
//!     false,
//!     Duration::from_secs(30),
//! )?;
//!
//! let route = StaticRoute {
//!     name: "dns_web_range_local_10_1_2_3_1a2b3c4d".to_string(),
//!     destination: "10.1.2.3/32".to_string(),
//!     next_hop: "172.21.55.20".to_string(),
//!     interface: None,
//!     metric: 10,
//! };
//! client.submit_change(&route.xpath("default"), &route.to_element()).await?;
//!
//! let job = client.commit().await?;
//! let job = wait_for_terminal(&client, job.job_id, Duration::from_secs(2), Duration::from_secs(60)).await?;
//! assert!(job.succeeded());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod gateway_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod models;
pub mod polling;
mod response;

pub use client::PanOsClient;
pub use error::GatewayError;
pub use gateway_trait::NetworkDeviceGateway;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{CommitOutcome, MockGateway};
pub use models::*;
pub use polling::{DEFAULT_COMMIT_TIMEOUT, DEFAULT_POLL_INTERVAL, wait_for_terminal};
