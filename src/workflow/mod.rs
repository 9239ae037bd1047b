mod job;
mod step;

pub use job::{Transition, WorkflowHandle, WorkflowJob, WorkflowStatus};
pub use step::{StepStatus, StepType, WorkflowStep};
