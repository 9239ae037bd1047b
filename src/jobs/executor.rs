//! Launches job work on the tokio runtime without blocking the caller.
//!
//! The work function owns the job's normal transitions. The executor only
//! steps in when the work ends abnormally (an `Err`, a panic, or returning
//! while the job is still non-terminal) and forces the job to a failed state.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::JobId;
use super::handle::{Handle, Tracked};
use super::registry::JobRegistry;
use crate::error::ExecutorError;

/// A job accepted by [`BackgroundExecutor::submit`].
///
/// `task` resolves once the work has ended and the job is terminal, so a
/// supervisor can await it or watch it for executor-level faults.
#[derive(Debug)]
pub struct Submitted<T> {
    pub handle: Handle<T>,
    pub task: JoinHandle<()>,
}

impl<T> Submitted<T> {
    pub fn id(&self) -> JobId {
        self.handle.id()
    }
}

/// Bounded launcher for background jobs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackgroundExecutor {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl BackgroundExecutor {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_jobs)),
            limit: max_concurrent_jobs,
        }
    }

    /// Number of jobs that may run concurrently.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Registers `job` and runs `work` on an independent task.
    ///
    /// Capacity and runtime availability are checked before anything is
    /// registered, so an `Err` means no job was created.
    pub fn submit<T, F, Fut>(
        &self,
        registry: &JobRegistry<T>,
        job: T,
        work: F,
    ) -> Result<Submitted<T>, ExecutorError>
    where
        T: Tracked + Send + 'static,
        F: FnOnce(Handle<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (runtime, permit) = self.acquire()?;
        let handle = registry.register(job);
        let task = Self::spawn_supervised(&runtime, permit, handle.clone(), work);
        Ok(Submitted { handle, task })
    }

    /// Runs `work` for a job that is already registered.
    pub fn launch<T, F, Fut>(
        &self,
        handle: Handle<T>,
        work: F,
    ) -> Result<Submitted<T>, ExecutorError>
    where
        T: Tracked + Send + 'static,
        F: FnOnce(Handle<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (runtime, permit) = self.acquire()?;
        let task = Self::spawn_supervised(&runtime, permit, handle.clone(), work);
        Ok(Submitted { handle, task })
    }

    fn acquire(&self) -> Result<(RuntimeHandle, OwnedSemaphorePermit), ExecutorError> {
        let runtime = RuntimeHandle::try_current().map_err(|_| ExecutorError::NoRuntime)?;
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| ExecutorError::Saturated { limit: self.limit })?;
        Ok((runtime, permit))
    }

    fn spawn_supervised<T, F, Fut>(
        runtime: &RuntimeHandle,
        permit: OwnedSemaphorePermit,
        supervised: Handle<T>,
        work: F,
    ) -> JoinHandle<()>
    where
        T: Tracked + Send + 'static,
        F: FnOnce(Handle<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        runtime.spawn(async move {
            let _permit = permit;
            let worker = supervised.clone();
            let outcome = tokio::spawn(async move { work(worker).await }).await;

            let fault = match outcome {
                Ok(Ok(())) if supervised.is_terminal() => None,
                Ok(Ok(())) => {
                    Some("unexpected error: work ended before the job finished".to_string())
                }
                Ok(Err(e)) => Some(format!("unexpected error: {e:#}")),
                Err(e) if e.is_panic() => {
                    Some("unexpected error: background task panicked".to_string())
                }
                Err(_) => Some("unexpected error: background task was aborted".to_string()),
            };

            if let Some(error) = fault {
                let id = supervised.id();
                if supervised.with(|job| job.fault(error.clone())) {
                    tracing::error!(job_id = %id, %error, "background job failed unexpectedly");
                }
            }
        })
    }
}

impl Default for BackgroundExecutor {
    fn default() -> Self {
        Self::new(crate::config::default_max_concurrent_jobs())
    }
}
