//! Mock firewall for unit testing
//!
//! Keeps separate candidate and running configurations so tests can assert
//! that nothing reaches the running config until a commit job finishes OK.
//! Commit outcomes are scripted per commit; unscripted commits succeed.

use crate::error::GatewayError;
use crate::gateway_trait::NetworkDeviceGateway;
use crate::models::{CommitJob, JobStatus};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// How the next commit behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Job reports `ACT` once, then `FIN`/`OK`; candidate becomes running
    Succeed,
    /// Job reports `FIN`/`FAIL` with these details; running config untouched
    Fail(String),
    /// Job stays `ACT` forever
    NeverFinish,
    /// The commit request itself errors
    Unreachable,
}

#[derive(Debug)]
struct JobState {
    polls: u32,
    outcome: CommitOutcome,
    snapshot: BTreeMap<String, String>,
}

/// Mock NetworkDeviceGateway for testing
#[derive(Debug, Clone)]
pub struct MockGateway {
    device_id: String,
    candidate: Arc<Mutex<BTreeMap<String, String>>>,
    running: Arc<Mutex<BTreeMap<String, String>>>,
    jobs: Arc<Mutex<HashMap<u64, JobState>>>,
    outcomes: Arc<Mutex<VecDeque<CommitOutcome>>>,
    next_job_id: Arc<Mutex<u64>>,
    fail_submit: Arc<Mutex<Option<String>>>,
    fail_delete: Arc<Mutex<Option<String>>>,
    submits: Arc<Mutex<u32>>,
}

impl MockGateway {
    /// Create a new mock device
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            candidate: Arc::new(Mutex::new(BTreeMap::new())),
            running: Arc::new(Mutex::new(BTreeMap::new())),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            next_job_id: Arc::new(Mutex::new(1)),
            fail_submit: Arc::new(Mutex::new(None)),
            fail_delete: Arc::new(Mutex::new(None)),
            submits: Arc::new(Mutex::new(0)),
        }
    }

    /// Queue the outcome of the next unscripted commit
    pub fn push_commit_outcome(&self, outcome: CommitOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Make `submit_change` fail with `message` (None to heal)
    pub fn set_fail_submit(&self, message: Option<&str>) {
        *self.fail_submit.lock().unwrap() = message.map(str::to_string);
    }

    /// Make `delete_change` fail with `message` (None to heal)
    pub fn set_fail_delete(&self, message: Option<&str>) {
        *self.fail_delete.lock().unwrap() = message.map(str::to_string);
    }

    /// Seed an element into both candidate and running config
    pub fn seed(&self, selector: &str, payload: &str) {
        self.candidate.lock().unwrap().insert(selector.to_string(), payload.to_string());
        self.running.lock().unwrap().insert(selector.to_string(), payload.to_string());
    }

    /// Element in the candidate config
    pub fn candidate(&self, selector: &str) -> Option<String> {
        self.candidate.lock().unwrap().get(selector).cloned()
    }

    /// Element in the running config
    pub fn running(&self, selector: &str) -> Option<String> {
        self.running.lock().unwrap().get(selector).cloned()
    }

    /// Number of elements in the running config
    pub fn running_len(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    /// Number of commits submitted
    pub fn commit_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Number of successful `submit_change` calls
    pub fn submit_count(&self) -> u32 {
        *self.submits.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl NetworkDeviceGateway for MockGateway {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn read_change(&self, selector: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.candidate(selector))
    }

    async fn submit_change(&self, selector: &str, payload: &str) -> Result<(), GatewayError> {
        if let Some(message) = self.fail_submit.lock().unwrap().clone() {
            return Err(GatewayError::Api(message));
        }
        self.candidate
            .lock()
            .unwrap()
            .insert(selector.to_string(), payload.to_string());
        *self.submits.lock().unwrap() += 1;
        Ok(())
    }

    async fn delete_change(&self, selector: &str) -> Result<(), GatewayError> {
        if let Some(message) = self.fail_delete.lock().unwrap().clone() {
            return Err(GatewayError::Api(message));
        }
        self.candidate.lock().unwrap().remove(selector);
        Ok(())
    }

    async fn commit(&self) -> Result<CommitJob, GatewayError> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CommitOutcome::Succeed);
        if outcome == CommitOutcome::Unreachable {
            return Err(GatewayError::Api(format!("{} is unreachable", self.device_id)));
        }

        let job_id = {
            let mut next = self.next_job_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let snapshot = self.candidate.lock().unwrap().clone();
        self.jobs.lock().unwrap().insert(
            job_id,
            JobState {
                polls: 0,
                outcome,
                snapshot,
            },
        );

        Ok(CommitJob {
            job_id,
            status: JobStatus::Pending,
            progress: 0,
            details: String::new(),
        })
    }

    async fn poll(&self, job_id: u64) -> Result<CommitJob, GatewayError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| GatewayError::Api(format!("job {} not found", job_id)))?;
        job.polls += 1;

        let (status, details) = match &job.outcome {
            CommitOutcome::Succeed if job.polls > 1 => (JobStatus::FinishedOk, String::new()),
            CommitOutcome::Fail(details) if job.polls > 1 => (JobStatus::FinishedError, details.clone()),
            _ => (JobStatus::Running, String::new()),
        };

        // Apply on the first terminal report only
        if status == JobStatus::FinishedOk && job.polls == 2 {
            *self.running.lock().unwrap() = job.snapshot.clone();
        }

        Ok(CommitJob {
            job_id,
            status,
            progress: if status.is_terminal() { 100 } else { 50 },
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::wait_for_terminal;
    use std::time::Duration;

    #[tokio::test]
    async fn test_changes_reach_running_only_after_commit() {
        let gateway = MockGateway::new("fw-test");
        gateway.submit_change("/x", "<a/>").await.unwrap();
        assert_eq!(gateway.running("/x"), None);

        let job = gateway.commit().await.unwrap();
        let done = wait_for_terminal(&gateway, job.job_id, Duration::from_millis(1), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(done.succeeded());
        assert_eq!(gateway.running("/x").as_deref(), Some("<a/>"));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_running_untouched() {
        let gateway = MockGateway::new("fw-test");
        gateway.push_commit_outcome(CommitOutcome::Fail("bad route".to_string()));
        gateway.submit_change("/x", "<a/>").await.unwrap();

        let job = gateway.commit().await.unwrap();
        let done = wait_for_terminal(&gateway, job.job_id, Duration::from_millis(1), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::FinishedError);
        assert_eq!(done.details, "bad route");
        assert_eq!(gateway.running_len(), 0);
    }
}
