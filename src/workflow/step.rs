use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepType {
    Ingestion = 1,
    Ocr = 2,
    Classification = 3,
    Extraction = 4,
    Export = 5,
}

impl StepType {
    pub const ALL: [StepType; 5] = [
        StepType::Ingestion,
        StepType::Ocr,
        StepType::Classification,
        StepType::Extraction,
        StepType::Export,
    ];

    /// 1-based position in the pipeline.
    pub fn order(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<StepType> {
        Self::ALL.get(self.order() as usize).copied()
    }

    pub fn previous(self) -> Option<StepType> {
        (self.order() as usize)
            .checked_sub(2)
            .map(|i| Self::ALL[i])
    }

    /// Lowercase name used in config keys and URLs.
    pub fn name(self) -> &'static str {
        match self {
            StepType::Ingestion => "ingestion",
            StepType::Ocr => "ocr",
            StepType::Classification => "classification",
            StepType::Extraction => "extraction",
            StepType::Export => "export",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepType::Ingestion => write!(f, "INGESTION"),
            StepType::Ocr => write!(f, "OCR"),
            StepType::Classification => write!(f, "CLASSIFICATION"),
            StepType::Extraction => write!(f, "EXTRACTION"),
            StepType::Export => write!(f, "EXPORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "PENDING"),
            StepStatus::Processing => write!(f, "PROCESSING"),
            StepStatus::Completed => write!(f, "COMPLETED"),
            StepStatus::Failed => write!(f, "FAILED"),
            StepStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Status record of one stage inside a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_type: StepType,
    pub order: u8,
    pub status: StepStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            order: step_type.order(),
            status: StepStatus::Pending,
            result: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = StepStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn complete(&mut self, result: String) {
        self.status = StepStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = StepStatus::Failed;
        self.error_message = Some(error);
        self.completed_at = Some(Utc::now());
    }
}
