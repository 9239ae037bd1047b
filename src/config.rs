//! Configuration loaded from `captureflow.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `CAPTUREFLOW_LOG` and `CAPTUREFLOW_MAX_JOBS` take precedence over the file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::workflow::StepType;

pub const CONFIG_FILE: &str = "captureflow.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Background jobs allowed to run at once; further submissions are rejected.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deadline for a single stage call. Unset means no deadline.
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
}

/// Base URLs of the stage services used by the HTTP stage executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub ingestion: Option<String>,
    #[serde(default)]
    pub ocr: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub extraction: Option<String>,
    #[serde(default)]
    pub export: Option<String>,
    #[serde(default = "default_stage_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Scheme prepended to `service` when building target URLs.
    #[serde(default = "default_target_scheme")]
    pub target_scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. "info" or "captureflow=debug".
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

pub fn default_max_concurrent_jobs() -> usize {
    256
}

fn default_stage_http_timeout_secs() -> u64 {
    120
}

fn default_scheduler_http_timeout_secs() -> u64 {
    30
}

fn default_target_scheme() -> String {
    "http".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            ingestion: None,
            ocr: None,
            classification: None,
            extraction: None,
            export: None,
            http_timeout_secs: default_stage_http_timeout_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_scheduler_http_timeout_secs(),
            target_scheme: default_target_scheme(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl StagesConfig {
    pub fn endpoint(&self, step: StepType) -> Option<&str> {
        let url = match step {
            StepType::Ingestion => &self.ingestion,
            StepType::Ocr => &self.ocr,
            StepType::Classification => &self.classification,
            StepType::Extraction => &self.extraction,
            StepType::Export => &self.export,
        };
        url.as_deref()
    }
}

impl CaptureConfig {
    /// Loads `captureflow.toml` from the current directory, falling back to
    /// defaults when it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<CaptureConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = var("CAPTUREFLOW_LOG").filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        if let Some(max) = var("CAPTUREFLOW_MAX_JOBS").filter(|v| !v.is_empty()) {
            self.executor.max_concurrent_jobs = max
                .parse()
                .with_context(|| format!("CAPTUREFLOW_MAX_JOBS is not a number: {max}"))?;
        }
        Ok(self)
    }
}
