//! DNS Management API Client
//!
//! Publishes and withdraws host records through the DNS tool's REST API
//! (`/api/auth/login`, `/api/dns/records`).
//!
//! # Example
//!
//! ```no_run
//! use dns_client::{DnsApiClient, DnsPublisher, DEFAULT_TTL};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DnsApiClient::new(
//!     "http://dns-tool:5000".to_string(),
//!     "admin".to_string(),
//!     "secret".to_string(),
//!     Duration::from_secs(30),
//! )?;
//!
//! client.create_record("web01.range.local", "10.1.2.3".parse()?, "range.local", DEFAULT_TTL).await?;
//! client.delete_record("web01.range.local").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
#[path = "trait.rs"]
pub mod dns_trait;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod models;

pub use client::DnsApiClient;
pub use dns_trait::DnsPublisher;
pub use error::DnsError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockDnsPublisher;
pub use models::*;
