use std::sync::Arc;
use std::time::Duration;

use crate::config::CaptureConfig;
use crate::error::OrchestratorError;
use crate::jobs::{BackgroundExecutor, JobId, JobRegistry, Submitted};
use crate::outcome::Outcome;
use crate::stages::StageExecutor;
use crate::workflow::{StepType, Transition, WorkflowHandle, WorkflowJob, WorkflowStatus};

pub const CANCELLED_MESSAGE: &str = "workflow cancelled by user";

/// Drives documents through the five-stage pipeline.
///
/// Each workflow runs on its own background task; its steps execute strictly
/// in order while distinct workflows proceed in parallel. Cancellation is
/// cooperative: it marks the workflow terminal immediately and the in-flight
/// stage result is discarded when it arrives.
pub struct WorkflowOrchestrator<E: StageExecutor> {
    registry: JobRegistry<WorkflowJob>,
    executor: BackgroundExecutor,
    stages: Arc<E>,
    stage_timeout: Option<Duration>,
}

impl<E: StageExecutor> WorkflowOrchestrator<E> {
    pub fn new(stages: E, executor: BackgroundExecutor) -> Self {
        Self {
            registry: JobRegistry::new(),
            executor,
            stages: Arc::new(stages),
            stage_timeout: None,
        }
    }

    pub fn from_config(stages: E, config: &CaptureConfig) -> Self {
        Self::new(
            stages,
            BackgroundExecutor::new(config.executor.max_concurrent_jobs),
        )
        .with_stage_timeout(config.orchestrator.stage_timeout())
    }

    /// Sets a deadline per stage call. Expiry fails the step like any other
    /// stage error.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Registers a workflow for `document_id` and starts it in the background.
    ///
    /// Returns as soon as the workflow is Processing; poll [`get`](Self::get)
    /// or await the returned task for completion.
    pub fn start(
        &self,
        document_id: &str,
        batch_id: &str,
    ) -> Result<Submitted<WorkflowJob>, OrchestratorError> {
        let mut job = WorkflowJob::new(document_id, batch_id);
        job.start_processing();

        let stages = Arc::clone(&self.stages);
        let stage_timeout = self.stage_timeout;
        let submitted = self.executor.submit(&self.registry, job, move |job| {
            run_pipeline(job, stages, stage_timeout)
        })?;
        tracing::info!(
            job_id = %submitted.id(),
            document_id,
            batch_id,
            "workflow started"
        );
        Ok(submitted)
    }

    /// Registers a workflow without launching it; see [`process_pending`](Self::process_pending).
    pub fn enqueue(&self, document_id: &str, batch_id: &str) -> WorkflowJob {
        let handle = self.registry.register(WorkflowJob::new(document_id, batch_id));
        tracing::debug!(job_id = %handle.id(), document_id, "workflow queued");
        handle.snapshot()
    }

    /// Launches every registered workflow that is still Pending.
    ///
    /// Stops at the first launch failure and returns it; workflows already
    /// launched keep running.
    pub fn process_pending(&self) -> Result<Vec<Submitted<WorkflowJob>>, OrchestratorError> {
        let mut launched = Vec::new();
        for handle in self.registry.list_by_status(WorkflowStatus::Pending) {
            if !handle.with(WorkflowJob::start_processing) {
                continue;
            }
            let stages = Arc::clone(&self.stages);
            let stage_timeout = self.stage_timeout;
            let work = move |job| run_pipeline(job, stages, stage_timeout);
            match self.executor.launch(handle.clone(), work) {
                Ok(submitted) => launched.push(submitted),
                Err(e) => {
                    handle.with(|job| job.fail(format!("failed to launch workflow: {e}")));
                    return Err(e.into());
                }
            }
        }
        Ok(launched)
    }

    pub fn get(&self, id: &JobId) -> Result<WorkflowJob, OrchestratorError> {
        self.registry
            .get(id)
            .map(|handle| handle.snapshot())
            .ok_or(OrchestratorError::NotFound(*id))
    }

    /// Workflows currently Processing.
    pub fn list_active(&self) -> Vec<WorkflowJob> {
        self.registry
            .list_by_status(WorkflowStatus::Processing)
            .into_iter()
            .map(|handle| handle.snapshot())
            .filter(|job| job.status == WorkflowStatus::Processing)
            .collect()
    }

    /// Marks a running workflow Cancelled. The stage call in flight is not
    /// interrupted.
    pub fn cancel(&self, id: &JobId) -> Result<(), OrchestratorError> {
        let handle = self
            .registry
            .get(id)
            .ok_or(OrchestratorError::NotFound(*id))?;

        if handle.with(|job| job.cancel(CANCELLED_MESSAGE)) {
            tracing::info!(job_id = %id, "workflow cancelled");
            Ok(())
        } else {
            Err(OrchestratorError::NotCancellable {
                id: *id,
                status: handle.status(),
            })
        }
    }
}

async fn run_pipeline<E: StageExecutor>(
    job: WorkflowHandle,
    stages: Arc<E>,
    stage_timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let id = job.id();
    let document_id = job.with(|j| j.document_id.clone());
    let mut step = StepType::Ingestion;

    loop {
        if !job.with(|j| j.begin_step(step)) {
            tracing::debug!(job_id = %id, %step, "workflow no longer processing");
            return Ok(());
        }
        tracing::info!(job_id = %id, %step, "step started");

        let outcome = run_stage(stages.as_ref(), step, &document_id, stage_timeout).await;
        if let Some(error) = outcome.error() {
            tracing::warn!(job_id = %id, %step, error, "step failed");
        }

        match job.with(|j| j.apply(step, outcome)) {
            Transition::Next(next) => {
                tracing::info!(job_id = %id, %step, "step completed");
                step = next;
            }
            Transition::Finished(WorkflowStatus::Completed) => {
                tracing::info!(job_id = %id, %document_id, "workflow completed");
                return Ok(());
            }
            Transition::Finished(status) => {
                tracing::warn!(job_id = %id, %step, %status, "workflow halted");
                return Ok(());
            }
            Transition::Dropped => {
                tracing::debug!(job_id = %id, %step, "late stage result dropped");
                return Ok(());
            }
        }
    }
}

async fn run_stage<E: StageExecutor>(
    stages: &E,
    step: StepType,
    document_id: &str,
    stage_timeout: Option<Duration>,
) -> Outcome<String> {
    let Some(limit) = stage_timeout else {
        return stages.run(step, document_id).await;
    };
    match tokio::time::timeout(limit, stages.run(step, document_id)).await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::failure(format!("stage {} timed out after {limit:?}", step.name())),
    }
}
