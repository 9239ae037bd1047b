//! Job lifecycle, document pipeline orchestration and scheduled triggers for
//! a document capture system.
//!
//! - [`jobs`]: the generic job record, registry and bounded background executor.
//! - [`workflow`] and [`orchestrator`]: the five-stage document pipeline.
//! - [`stages`]: the stage executor seam and its HTTP / simulated implementations.
//! - [`timer`]: cron, interval and one-shot triggers that call target services.

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod orchestrator;
pub mod outcome;
pub mod stages;
pub mod timer;
pub mod workflow;

pub use error::{ExecutorError, JobError, JobServiceError, OrchestratorError, ScheduleError};
pub use orchestrator::WorkflowOrchestrator;
pub use outcome::Outcome;
