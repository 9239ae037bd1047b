use std::future::Future;
use std::sync::Arc;

use super::executor::BackgroundExecutor;
use super::job::{Job, JobHandle, JobId, JobStatus};
use super::params::Parameters;
use super::registry::JobRegistry;
use crate::error::JobServiceError;

/// The work one processing service performs for a job (OCR, export, ...).
///
/// Returning `Err` fails the job with the error text. The processor may
/// report progress through the handle and should check
/// [`is_terminal`](crate::jobs::Handle::is_terminal) to notice cancellation.
pub trait JobProcessor: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn process(
        &self,
        job: JobHandle<Self::Output>,
    ) -> impl Future<Output = anyhow::Result<Self::Output>> + Send;
}

/// The create/get/list/cancel boundary shared by every processing service.
pub struct JobService<P: JobProcessor> {
    registry: JobRegistry<Job<P::Output>>,
    executor: BackgroundExecutor,
    processor: Arc<P>,
}

impl<P: JobProcessor> JobService<P> {
    pub fn new(processor: P, executor: BackgroundExecutor) -> Self {
        Self {
            registry: JobRegistry::new(),
            executor,
            processor: Arc::new(processor),
        }
    }

    /// Creates a job and starts processing it in the background.
    pub fn create(&self, parameters: Parameters) -> Result<Job<P::Output>, JobServiceError> {
        let processor = Arc::clone(&self.processor);
        let submitted = self
            .executor
            .submit(&self.registry, Job::new(parameters), move |job| async move {
                if !job.start()? {
                    return Ok(());
                }
                let id = job.id();
                tracing::info!(job_id = %id, "job started");

                match processor.process(job.clone()).await {
                    Ok(output) => {
                        if job.complete(output)? {
                            tracing::info!(job_id = %id, "job completed");
                        } else {
                            tracing::debug!(job_id = %id, "result dropped, job already terminal");
                        }
                    }
                    Err(e) => {
                        if job.fail(format!("{e:#}")) {
                            tracing::warn!(job_id = %id, error = %e, "job failed");
                        }
                    }
                }
                Ok(())
            })?;

        Ok(submitted.handle.snapshot())
    }

    pub fn get(&self, id: &JobId) -> Result<Job<P::Output>, JobServiceError> {
        self.registry
            .get(id)
            .map(|handle| handle.snapshot())
            .ok_or(JobServiceError::NotFound(*id))
    }

    /// Jobs currently running.
    pub fn list_active(&self) -> Vec<Job<P::Output>> {
        self.registry
            .list_by_status(JobStatus::Running)
            .into_iter()
            .map(|handle| handle.snapshot())
            .filter(|job| job.status == JobStatus::Running)
            .collect()
    }

    /// Cancels a running job. In-flight processing is not interrupted; its
    /// eventual result is discarded.
    pub fn cancel(&self, id: &JobId) -> Result<(), JobServiceError> {
        let handle = self.registry.get(id).ok_or(JobServiceError::NotFound(*id))?;
        match handle.cancel() {
            Ok(true) => {
                tracing::info!(job_id = %id, "job cancelled");
                Ok(())
            }
            Ok(false) | Err(_) => Err(JobServiceError::NotCancellable {
                id: *id,
                status: handle.status(),
            }),
        }
    }
}
