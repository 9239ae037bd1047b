use std::collections::HashMap;
use std::time::Duration;

use super::StageExecutor;
use crate::outcome::Outcome;
use crate::workflow::StepType;

/// In-process stand-in for the stage services.
///
/// Each stage sleeps for its configured delay and then succeeds, unless a
/// failure was injected for it.
#[derive(Debug, Clone, Default)]
pub struct SimulatedStages {
    delays: HashMap<StepType, Duration>,
    failures: HashMap<StepType, String>,
}

impl SimulatedStages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays roughly matching the real services (OCR being the slowest).
    pub fn realistic() -> Self {
        Self::new()
            .with_delay(StepType::Ingestion, Duration::from_millis(500))
            .with_delay(StepType::Ocr, Duration::from_millis(1000))
            .with_delay(StepType::Classification, Duration::from_millis(800))
            .with_delay(StepType::Extraction, Duration::from_millis(1200))
            .with_delay(StepType::Export, Duration::from_millis(600))
    }

    pub fn with_delay(mut self, step: StepType, delay: Duration) -> Self {
        self.delays.insert(step, delay);
        self
    }

    pub fn failing_at(mut self, step: StepType, error: impl Into<String>) -> Self {
        self.failures.insert(step, error.into());
        self
    }
}

impl StageExecutor for SimulatedStages {
    async fn run(&self, step: StepType, document_id: &str) -> Outcome<String> {
        if let Some(delay) = self.delays.get(&step) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&step) {
            return Outcome::failure(error.clone());
        }
        let text = match step {
            StepType::Ingestion => format!("document {document_id} ingested"),
            StepType::Ocr => format!("OCR completed for {document_id}"),
            StepType::Classification => format!("document {document_id} classified as invoice"),
            StepType::Extraction => format!("fields extracted from {document_id}"),
            StepType::Export => format!("document {document_id} exported"),
        };
        Outcome::success(text)
    }
}
