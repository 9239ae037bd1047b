//! Wire types exchanged with stage services.
//!
//! A stage service receives a [`StageRequest`] and answers with a
//! [`StageResponse`] shaped as `{success, value?, errors?}`.

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// Body posted to a stage service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    pub document_id: String,
    /// Lowercase stage name ("ocr", "export", ...).
    pub stage: String,
}

/// Body returned by a stage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<StageResponse> for Outcome<String> {
    fn from(resp: StageResponse) -> Self {
        if resp.success {
            Outcome::Success(resp.value.unwrap_or_default())
        } else {
            Outcome::failures(resp.errors)
        }
    }
}

impl From<Outcome<String>> for StageResponse {
    fn from(outcome: Outcome<String>) -> Self {
        match outcome {
            Outcome::Success(value) => Self {
                success: true,
                value: Some(value),
                errors: Vec::new(),
            },
            Outcome::Failure(errors) => Self {
                success: false,
                value: None,
                errors,
            },
        }
    }
}
