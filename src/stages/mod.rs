//! Pipeline stage executors.
//!
//! The orchestrator drives each stage through [`StageExecutor`]. OCR engines,
//! classifiers and exporters live behind it in their own services; this crate
//! ships an HTTP client for those services and an in-process simulation.

pub mod http;
pub mod simulated;
pub mod types;

use std::future::Future;

use crate::outcome::Outcome;
use crate::workflow::StepType;

pub use http::HttpStageExecutor;
pub use simulated::SimulatedStages;
pub use types::{StageRequest, StageResponse};

/// Performs the actual work of one pipeline stage for one document.
///
/// One call per stage; retries, if any, belong inside the implementation.
pub trait StageExecutor: Send + Sync + 'static {
    fn run(
        &self,
        step: StepType,
        document_id: &str,
    ) -> impl Future<Output = Outcome<String>> + Send;
}
