use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;

use super::StageExecutor;
use super::types::{StageRequest, StageResponse};
use crate::config::StagesConfig;
use crate::outcome::Outcome;
use crate::workflow::StepType;

/// Runs stages by posting to the stage services over HTTP.
///
/// Transport errors, non-2xx statuses and undecodable bodies all come back
/// as `Outcome::Failure`, so they halt the workflow like any stage failure.
pub struct HttpStageExecutor {
    client: Client,
    endpoints: HashMap<StepType, String>,
}

impl HttpStageExecutor {
    pub fn new(endpoints: HashMap<StepType, String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, endpoints })
    }

    pub fn from_config(config: &StagesConfig) -> reqwest::Result<Self> {
        let endpoints = StepType::ALL
            .iter()
            .filter_map(|&step| config.endpoint(step).map(|url| (step, url.to_string())))
            .collect();
        Self::new(endpoints, Duration::from_secs(config.http_timeout_secs))
    }

    async fn call(&self, url: &str, step: StepType, document_id: &str) -> Outcome<String> {
        let req = StageRequest {
            document_id: document_id.to_string(),
            stage: step.name().to_string(),
        };

        let response = match self.client.post(url).json(&req).send().await {
            Ok(response) => response,
            Err(e) => return Outcome::failure(format!("stage {} unreachable: {e}", step.name())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Outcome::failure(format!(
                "stage {} returned status {}: {body}",
                step.name(),
                status.as_u16()
            ));
        }

        match response.json::<StageResponse>().await {
            Ok(body) => body.into(),
            Err(e) => Outcome::failure(format!(
                "stage {} sent an invalid response: {e}",
                step.name()
            )),
        }
    }
}

impl StageExecutor for HttpStageExecutor {
    async fn run(&self, step: StepType, document_id: &str) -> Outcome<String> {
        let Some(url) = self.endpoints.get(&step) else {
            return Outcome::failure(format!("no endpoint configured for stage {}", step.name()));
        };
        tracing::debug!(stage = step.name(), %url, document_id, "calling stage service");
        self.call(url, step, document_id).await
    }
}
