use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

use super::step::{StepStatus, StepType, WorkflowStep};
use crate::jobs::{Handle, JobId, Tracked};
use crate::outcome::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "PENDING"),
            WorkflowStatus::Processing => write!(f, "PROCESSING"),
            WorkflowStatus::Completed => write!(f, "COMPLETED"),
            WorkflowStatus::Failed => write!(f, "FAILED"),
            WorkflowStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// What the pipeline should do after a stage result has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Run this step next.
    Next(StepType),
    /// The workflow reached a terminal status.
    Finished(WorkflowStatus),
    /// The workflow was already terminal; the result was discarded.
    Dropped,
}

fn pipeline_steps<'de, D>(deserializer: D) -> Result<Vec<WorkflowStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let steps = Vec::<WorkflowStep>::deserialize(deserializer)?;
    let in_order = steps.len() == StepType::ALL.len()
        && steps
            .iter()
            .zip(StepType::ALL)
            .all(|(step, expected)| step.step_type == expected);
    if !in_order {
        return Err(de::Error::custom("expected one step per stage in pipeline order"));
    }
    Ok(steps)
}

/// The full five-stage pipeline for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: JobId,
    pub document_id: String,
    pub batch_id: String,
    pub status: WorkflowStatus,
    /// One step per stage, in pipeline order.
    #[serde(deserialize_with = "pipeline_steps")]
    steps: Vec<WorkflowStep>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowJob {
    pub fn new(document_id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.into(),
            batch_id: batch_id.into(),
            status: WorkflowStatus::Pending,
            steps: StepType::ALL.iter().map(|&s| WorkflowStep::new(s)).collect(),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn step(&self, step_type: StepType) -> &WorkflowStep {
        &self.steps[step_type.order() as usize - 1]
    }

    fn step_mut(&mut self, step_type: StepType) -> &mut WorkflowStep {
        &mut self.steps[step_type.order() as usize - 1]
    }

    /// The step that halted the workflow, if any.
    pub fn failed_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn start_processing(&mut self) -> bool {
        if self.status != WorkflowStatus::Pending {
            return false;
        }
        self.status = WorkflowStatus::Processing;
        true
    }

    /// Marks `step_type` as Processing.
    ///
    /// Refused unless the workflow is Processing, the step is still Pending
    /// and its predecessor has Completed.
    pub fn begin_step(&mut self, step_type: StepType) -> bool {
        if self.status != WorkflowStatus::Processing {
            return false;
        }
        let ready = step_type
            .previous()
            .is_none_or(|prev| self.step(prev).status == StepStatus::Completed);
        let step = self.step_mut(step_type);
        if !ready || step.status != StepStatus::Pending {
            return false;
        }
        step.start();
        true
    }

    /// Applies a stage result to a step that is in flight.
    ///
    /// Success advances to the next step or completes the workflow; failure
    /// marks both the step and the workflow Failed and leaves later steps
    /// Pending. A result arriving after the workflow went terminal is dropped.
    pub fn apply(&mut self, step_type: StepType, outcome: Outcome<String>) -> Transition {
        if self.status != WorkflowStatus::Processing
            || self.step(step_type).status != StepStatus::Processing
        {
            return Transition::Dropped;
        }

        match outcome {
            Outcome::Success(result) => {
                self.step_mut(step_type).complete(result);
                match step_type.next() {
                    Some(next) => Transition::Next(next),
                    None => {
                        debug_assert!(
                            self.steps.iter().all(|s| s.status == StepStatus::Completed)
                        );
                        self.status = WorkflowStatus::Completed;
                        self.completed_at = Some(Utc::now());
                        Transition::Finished(WorkflowStatus::Completed)
                    }
                }
            }
            Outcome::Failure(errors) => {
                let error = errors.join("; ");
                self.step_mut(step_type).fail(error.clone());
                self.status = WorkflowStatus::Failed;
                self.error_message = Some(error);
                self.completed_at = Some(Utc::now());
                Transition::Finished(WorkflowStatus::Failed)
            }
        }
    }

    /// Fails the workflow outright, along with the step in flight if there
    /// is one. Returns `false` if already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let error = error.into();
        if let Some(step) = self
            .steps
            .iter_mut()
            .find(|s| s.status == StepStatus::Processing)
        {
            step.fail(error.clone());
        }
        self.status = WorkflowStatus::Failed;
        self.error_message = Some(error);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Cancels a workflow that has not finished. Returns `false` if already
    /// terminal.
    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = WorkflowStatus::Cancelled;
        self.error_message = Some(reason.into());
        self.completed_at = Some(Utc::now());
        true
    }
}

impl Tracked for WorkflowJob {
    type Status = WorkflowStatus;

    fn id(&self) -> JobId {
        self.id
    }

    fn status(&self) -> WorkflowStatus {
        self.status
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn fault(&mut self, error: String) -> bool {
        self.fail(error)
    }
}

pub type WorkflowHandle = Handle<WorkflowJob>;

#[cfg(test)]
mod tests {
    use super::*;

    fn processing() -> WorkflowJob {
        let mut job = WorkflowJob::new("D1", "B1");
        assert!(job.start_processing());
        job
    }

    fn statuses(job: &WorkflowJob) -> Vec<StepStatus> {
        job.steps.iter().map(|s| s.status).collect()
    }

    #[test]
    fn new_job_has_five_pending_steps_in_order() {
        let job = WorkflowJob::new("D1", "B1");
        assert_eq!(job.status, WorkflowStatus::Pending);
        assert_eq!(job.steps.len(), 5);
        let types: Vec<StepType> = job.steps.iter().map(|s| s.step_type).collect();
        assert_eq!(types, StepType::ALL.to_vec());
        assert!(job.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn happy_path_walks_all_steps() {
        let mut job = processing();
        let mut step = StepType::Ingestion;
        loop {
            assert!(job.begin_step(step));
            match job.apply(step, Outcome::success(format!("{step} done"))) {
                Transition::Next(next) => step = next,
                Transition::Finished(status) => {
                    assert_eq!(status, WorkflowStatus::Completed);
                    break;
                }
                Transition::Dropped => panic!("unexpected drop"),
            }
        }
        assert_eq!(job.status, WorkflowStatus::Completed);
        assert!(job.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert!(job.completed_at.unwrap() >= job.started_at);
        assert_eq!(job.step(StepType::Export).result.as_deref(), Some("EXPORT done"));
    }

    #[test]
    fn step_cannot_start_before_predecessor_completes() {
        let mut job = processing();
        assert!(!job.begin_step(StepType::Ocr));

        assert!(job.begin_step(StepType::Ingestion));
        assert!(!job.begin_step(StepType::Ocr));
        assert!(!job.begin_step(StepType::Ingestion));

        job.apply(StepType::Ingestion, Outcome::success("ok".into()));
        assert!(job.begin_step(StepType::Ocr));
    }

    #[test]
    fn steps_require_processing_workflow() {
        let mut job = WorkflowJob::new("D1", "B1");
        assert!(!job.begin_step(StepType::Ingestion));
    }

    #[test]
    fn failure_halts_and_leaves_later_steps_pending() {
        let mut job = processing();
        for step in [StepType::Ingestion, StepType::Ocr, StepType::Classification] {
            job.begin_step(step);
            job.apply(step, Outcome::success("ok".into()));
        }
        job.begin_step(StepType::Extraction);
        let t = job.apply(StepType::Extraction, Outcome::failure("extraction timeout"));

        assert_eq!(t, Transition::Finished(WorkflowStatus::Failed));
        assert_eq!(
            statuses(&job),
            vec![
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Failed,
                StepStatus::Pending
            ]
        );
        assert_eq!(job.status, WorkflowStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("extraction timeout"));

        let failed = job.failed_step().unwrap();
        assert_eq!(failed.step_type, StepType::Extraction);
        assert_eq!(failed.error_message.as_deref(), Some("extraction timeout"));
        assert!(!job.begin_step(StepType::Export));
    }

    #[test]
    fn late_result_after_cancel_is_dropped() {
        let mut job = processing();
        job.begin_step(StepType::Ingestion);
        job.apply(StepType::Ingestion, Outcome::success("ok".into()));
        job.begin_step(StepType::Ocr);

        assert!(job.cancel("workflow cancelled by user"));
        assert_eq!(
            job.apply(StepType::Ocr, Outcome::success("late".into())),
            Transition::Dropped
        );
        assert_eq!(job.status, WorkflowStatus::Cancelled);
        assert!(job.step(StepType::Ocr).result.is_none());
        assert!(!job.cancel("again"));
        assert!(!job.fail("too late"));
        assert_eq!(job.error_message.as_deref(), Some("workflow cancelled by user"));
    }

    #[test]
    fn multiple_errors_are_joined() {
        let mut job = processing();
        job.begin_step(StepType::Ingestion);
        job.apply(
            StepType::Ingestion,
            Outcome::failures(["file missing", "batch closed"]),
        );
        assert_eq!(job.error_message.as_deref(), Some("file missing; batch closed"));
    }

    #[test]
    fn serializes_steps() {
        let job = WorkflowJob::new("D1", "B1");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["document_id"], "D1");
        assert_eq!(json["steps"][1]["step_type"], "Ocr");
        assert_eq!(json["steps"][1]["order"], 2);
    }

    #[test]
    fn deserialize_requires_every_stage_in_order() {
        let job = WorkflowJob::new("D1", "B1");
        let json = serde_json::to_value(&job).unwrap();
        let restored: WorkflowJob = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(restored.steps().len(), 5);

        let mut truncated = json.clone();
        truncated["steps"].as_array_mut().unwrap().truncate(2);
        assert!(serde_json::from_value::<WorkflowJob>(truncated).is_err());

        let mut shuffled = json;
        shuffled["steps"].as_array_mut().unwrap().swap(0, 1);
        assert!(serde_json::from_value::<WorkflowJob>(shuffled).is_err());
    }
}
