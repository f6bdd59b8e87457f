//! Commit-job polling
//!
//! A commit is only considered applied once its job reports `FIN`/`OK`.
//! Polling is bounded by a deadline; reaching it yields
//! [`GatewayError::PollTimeout`] so callers can treat the device state as unknown.

use crate::error::GatewayError;
use crate::gateway_trait::NetworkDeviceGateway;
use crate::models::CommitJob;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default interval between job polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for a commit job
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll `job_id` until it is terminal or `timeout` elapses.
///
/// A terminal job is returned as-is, including `FinishedError`; the caller
/// decides what a failed commit means. `job_id == 0` denotes a commit the
/// device applied without queueing a job and returns immediately.
pub async fn wait_for_terminal<G>(
    gateway: &G,
    job_id: u64,
    interval: Duration,
    timeout: Duration,
) -> Result<CommitJob, GatewayError>
where
    G: NetworkDeviceGateway + ?Sized,
{
    if job_id == 0 {
        return Ok(CommitJob::immediate());
    }

    let started = Instant::now();
    loop {
        let job = gateway.poll(job_id).await?;
        if job.is_terminal() {
            debug!(
                "Commit job {} on {} finished with {:?} after {:?}",
                job_id,
                gateway.device_id(),
                job.status,
                started.elapsed()
            );
            return Ok(job);
        }

        debug!(
            "Commit job {} on {} is {:?} ({}%)",
            job_id,
            gateway.device_id(),
            job.status,
            job.progress
        );

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(GatewayError::PollTimeout { job_id, waited });
        }
        tokio::time::sleep(interval.min(timeout - waited)).await;
    }
}
