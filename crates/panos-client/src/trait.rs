//! NetworkDeviceGateway trait for mocking
//!
//! Abstracts the firewall so route injection and commit handling can be
//! exercised against an in-memory device in unit tests.

use crate::error::GatewayError;
use crate::models::CommitJob;

/// Configuration gateway of a single network device
///
/// Changes are staged in the device's candidate configuration and only become
/// effective once a commit job finishes successfully.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait NetworkDeviceGateway: Send + Sync {
    /// Stable identity of the device (used in logs and error messages)
    fn device_id(&self) -> &str;

    /// Read the candidate-config element at `selector`, `None` if absent
    async fn read_change(&self, selector: &str) -> Result<Option<String>, GatewayError>;

    /// Stage `payload` at `selector` in the candidate config
    async fn submit_change(&self, selector: &str, payload: &str) -> Result<(), GatewayError>;

    /// Stage removal of the element at `selector`
    async fn delete_change(&self, selector: &str) -> Result<(), GatewayError>;

    /// Submit a commit of the candidate config
    async fn commit(&self) -> Result<CommitJob, GatewayError>;

    /// Current state of a commit job
    async fn poll(&self, job_id: u64) -> Result<CommitJob, GatewayError>;
}
