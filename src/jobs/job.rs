use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::handle::{Handle, Tracked};
use super::params::Parameters;
use crate::error::JobError;

pub type JobId = Uuid;

/// Lifecycle status of an asynchronous job.
///
/// Transitions: Pending → Running → {Completed, Failed, Cancelled}, plus
/// Pending → Failed when a job cannot be started at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One unit of trackable asynchronous work.
///
/// `R` is the kind-specific result payload (OCR text, export path, ...).
/// Once a job is terminal every transition method is a no-op that returns
/// `Ok(false)` and leaves status and result untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<R> {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub progress_message: Option<String>,
    pub parameters: Parameters,
    pub result: Option<R>,
    pub error_message: Option<String>,
}

impl<R> Job<R> {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            progress_message: None,
            parameters,
            result: None,
            error_message: None,
        }
    }

    pub fn start(&mut self) -> Result<bool, JobError> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Running;
                self.started_at = Some(Utc::now());
                Ok(true)
            }
            s if s.is_terminal() => Ok(false),
            from => Err(JobError::InvalidTransition {
                from,
                to: JobStatus::Running,
            }),
        }
    }

    /// Records progress. Values must not go backwards and cannot exceed 100.
    pub fn update_progress(
        &mut self,
        percent: u8,
        message: Option<String>,
    ) -> Result<bool, JobError> {
        match self.status {
            JobStatus::Running => {}
            s if s.is_terminal() => return Ok(false),
            status => return Err(JobError::NotRunning { status }),
        }
        if percent > 100 || percent < self.progress {
            return Err(JobError::InvalidProgress {
                current: self.progress,
                requested: percent,
            });
        }
        self.progress = percent;
        if message.is_some() {
            self.progress_message = message;
        }
        Ok(true)
    }

    pub fn complete(&mut self, result: R) -> Result<bool, JobError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Completed;
                self.completed_at = Some(Utc::now());
                self.progress = 100;
                self.result = Some(result);
                Ok(true)
            }
            s if s.is_terminal() => Ok(false),
            from => Err(JobError::InvalidTransition {
                from,
                to: JobStatus::Completed,
            }),
        }
    }

    /// Fails a pending or running job. Returns `false` if already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error.into());
        true
    }

    /// Best-effort cancellation of a running job.
    pub fn cancel(&mut self) -> Result<bool, JobError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Cancelled;
                self.completed_at = Some(Utc::now());
                Ok(true)
            }
            s if s.is_terminal() => Ok(false),
            from => Err(JobError::InvalidTransition {
                from,
                to: JobStatus::Cancelled,
            }),
        }
    }
}

impl<R> Tracked for Job<R> {
    type Status = JobStatus;

    fn id(&self) -> JobId {
        self.id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn fault(&mut self, error: String) -> bool {
        self.fail(error)
    }
}

/// Shared handle to a registered job.
pub type JobHandle<R> = Handle<Job<R>>;

impl<R> Handle<Job<R>> {
    pub fn start(&self) -> Result<bool, JobError> {
        self.with(Job::start)
    }

    pub fn update_progress(
        &self,
        percent: u8,
        message: Option<String>,
    ) -> Result<bool, JobError> {
        self.with(|job| job.update_progress(percent, message))
    }

    pub fn complete(&self, result: R) -> Result<bool, JobError> {
        self.with(|job| job.complete(result))
    }

    pub fn fail(&self, error: impl Into<String>) -> bool {
        self.with(|job| job.fail(error))
    }

    pub fn cancel(&self) -> Result<bool, JobError> {
        self.with(Job::cancel)
    }
}
