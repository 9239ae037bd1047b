//! Command-line interface built on clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use captureflow::jobs::{ParamValue, Parameters};
use captureflow::timer::HttpMethod;
use captureflow::workflow::StepType;

/// Drives the capture pipeline and scheduled triggers from the terminal.
#[derive(Debug, Parser)]
#[command(name = "captureflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./captureflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Ingestion,
    Ocr,
    Classification,
    Extraction,
    Export,
}

impl From<StageArg> for StepType {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Ingestion => StepType::Ingestion,
            StageArg::Ocr => StepType::Ocr,
            StageArg::Classification => StepType::Classification,
            StageArg::Extraction => StepType::Extraction,
            StageArg::Export => StepType::Export,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Get,
    Post,
}

impl From<MethodArg> for HttpMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => HttpMethod::Get,
            MethodArg::Post => HttpMethod::Post,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs one document through the pipeline with simulated stages.
    Run {
        #[arg(long)]
        document: String,

        #[arg(long, default_value = "batch-1")]
        batch: String,

        /// Makes this stage report a failure.
        #[arg(long, value_enum)]
        fail_at: Option<StageArg>,

        /// Error message reported by the failing stage.
        #[arg(long, default_value = "stage failed")]
        error: String,

        /// Calls the stage services from the configuration instead of simulating them.
        #[arg(long, default_value_t = false)]
        http: bool,
    },

    /// Runs several workflows concurrently and cancels one mid-flight.
    Demo {
        #[arg(long, default_value_t = 3)]
        documents: usize,
    },

    /// Creates an interval trigger and follows it until it completes.
    Schedule {
        /// Interval such as 30s, 5m, 1h or 1d.
        #[arg(long)]
        interval: String,

        /// Number of firings after which the trigger completes.
        #[arg(long)]
        max: Option<u32>,

        /// Target host and port, e.g. export-service:5005.
        #[arg(long)]
        service: String,

        #[arg(long)]
        endpoint: String,

        #[arg(long, value_enum, default_value_t = MethodArg::Post)]
        method: MethodArg,

        /// Job data sent with every firing, as key=value. Repeatable.
        #[arg(long = "data", value_parser = parse_key_value)]
        data: Vec<(String, String)>,
    },

    /// Prints the effective configuration.
    Config,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

/// Builds job data, typing integers, floats and booleans where they parse.
pub fn job_data(pairs: &[(String, String)]) -> Parameters {
    pairs
        .iter()
        .map(|(key, raw)| {
            let value = if let Ok(n) = raw.parse::<i64>() {
                ParamValue::Integer(n)
            } else if let Ok(x) = raw.parse::<f64>() {
                ParamValue::Float(x)
            } else if let Ok(b) = raw.parse::<bool>() {
                ParamValue::Bool(b)
            } else {
                ParamValue::Text(raw.clone())
            };
            (key.clone(), value)
        })
        .collect()
}
