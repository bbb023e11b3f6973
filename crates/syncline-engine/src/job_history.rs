//! Job-history collaborator: the last known status of each job.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Job is being set up.
    Initializing,
    /// Job plan created.
    Created,
    /// Waiting for resources.
    Pending,
    /// Tasks are being deployed.
    Scheduled,
    /// Tasks are running.
    Running,
    /// A failure is being handled.
    Failing,
    /// A savepoint is in progress.
    DoingSavepoint,
    /// Job failed.
    Failed,
    /// Cancellation in progress.
    Canceling,
    /// Job was cancelled.
    Canceled,
    /// Job stopped after a savepoint.
    SavepointDone,
    /// Job completed.
    Finished,
    /// Status can no longer be determined.
    Unknowable,
}

impl JobStatus {
    /// Whether the job has stopped and will not write more logs.
    #[must_use]
    pub fn is_end_state(self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Canceled | Self::SavepointDone | Self::Finished | Self::Unknowable
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Failing => "FAILING",
            Self::DoingSavepoint => "DOING_SAVEPOINT",
            Self::Failed => "FAILED",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
            Self::SavepointDone => "SAVEPOINT_DONE",
            Self::Finished => "FINISHED",
            Self::Unknowable => "UNKNOWABLE",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [JobStatus; 13] = [
            JobStatus::Initializing,
            JobStatus::Created,
            JobStatus::Pending,
            JobStatus::Scheduled,
            JobStatus::Running,
            JobStatus::Failing,
            JobStatus::DoingSavepoint,
            JobStatus::Failed,
            JobStatus::Canceling,
            JobStatus::Canceled,
            JobStatus::SavepointDone,
            JobStatus::Finished,
            JobStatus::Unknowable,
        ];
        let normalized = s.trim().to_uppercase().replace('-', "_");
        ALL.into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown job status: '{s}'"))
    }
}

/// Read access to job statuses.
pub trait JobHistory: Send + Sync {
    /// Last known status of `job_id`, or `None` if the job is unknown.
    fn job_status(&self, job_id: u64) -> Option<JobStatus>;
}

/// In-memory [`JobHistory`].
#[derive(Debug, Default)]
pub struct InMemoryJobHistory {
    jobs: RwLock<HashMap<u64, JobStatus>>,
}

impl InMemoryJobHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the status of a job.
    pub fn set_status(&self, job_id: u64, status: JobStatus) {
        self.jobs.write().insert(job_id, status);
    }

    /// Forgets a job.
    pub fn remove(&self, job_id: u64) -> Option<JobStatus> {
        self.jobs.write().remove(&job_id)
    }
}

impl JobHistory for InMemoryJobHistory {
    fn job_status(&self, job_id: u64) -> Option<JobStatus> {
        self.jobs.read().get(&job_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_states() {
        assert!(JobStatus::Finished.is_end_state());
        assert!(JobStatus::Canceled.is_end_state());
        assert!(JobStatus::Failed.is_end_state());
        assert!(!JobStatus::Running.is_end_state());
        assert!(!JobStatus::Failing.is_end_state());
        assert!(!JobStatus::Canceling.is_end_state());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "savepoint-done".parse::<JobStatus>().unwrap(),
            JobStatus::SavepointDone
        );
        assert_eq!(JobStatus::DoingSavepoint.to_string(), "DOING_SAVEPOINT");
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_in_memory_history() {
        let history = InMemoryJobHistory::new();
        history.set_status(7, JobStatus::Running);
        assert_eq!(history.job_status(7), Some(JobStatus::Running));
        history.set_status(7, JobStatus::Finished);
        assert_eq!(history.job_status(7), Some(JobStatus::Finished));
        assert_eq!(history.remove(7), Some(JobStatus::Finished));
        assert_eq!(history.job_status(7), None);
    }
}
