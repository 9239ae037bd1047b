use thiserror::Error;

use crate::jobs::{JobId, JobStatus};
use crate::timer::ScheduleStatus;
use crate::workflow::WorkflowStatus;

/// Violations of the job lifecycle rules.
///
/// These are caller bugs rather than runtime conditions: a background task
/// that receives one has driven its own job out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("progress can only be reported while running (status {status})")]
    NotRunning { status: JobStatus },

    #[error("invalid progress {requested}% (current {current}%, must be monotonic and <= 100)")]
    InvalidProgress { current: u8, requested: u8 },
}

/// Failures raised synchronously by
/// [`BackgroundExecutor::submit`](crate::jobs::BackgroundExecutor::submit).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("no async runtime available to run background jobs")]
    NoRuntime,

    #[error("executor saturated: {limit} jobs already running")]
    Saturated { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("Workflow not found: {0}")]
    NotFound(JobId),

    #[error("Workflow {id} cannot be cancelled in status {status}")]
    NotCancellable { id: JobId, status: WorkflowStatus },

    #[error("Failed to launch workflow: {0}")]
    Executor(#[from] ExecutorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobServiceError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} cannot be cancelled in status {status}")]
    NotCancellable { id: JobId, status: JobStatus },

    #[error("Failed to launch job: {0}")]
    Executor(#[from] ExecutorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid schedule: {0}")]
    Validation(String),

    #[error("Scheduled job not found: {0}")]
    NotFound(JobId),

    #[error("Cannot {action} scheduled job {id} in status {status}")]
    InvalidState {
        id: JobId,
        status: ScheduleStatus,
        action: &'static str,
    },

    #[error("Scheduling engine error: {0}")]
    Backend(String),
}
