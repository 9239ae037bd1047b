mod cli;
mod ui;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;

use captureflow::config::CaptureConfig;
use captureflow::jobs::{JobId, Parameters};
use captureflow::stages::{HttpStageExecutor, SimulatedStages, StageExecutor};
use captureflow::timer::{HttpInvoker, ScheduleStatus, Target, TimerService, TokioScheduler};
use captureflow::workflow::{StepStatus, StepType, WorkflowJob};
use captureflow::{WorkflowOrchestrator, logging};
use cli::{Cli, Command};
use ui::WorkflowProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CaptureConfig::load_from(path)?,
        None => CaptureConfig::load()?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    logging::init(&config.logging);

    match cli.command {
        Command::Run {
            document,
            batch,
            fail_at,
            error,
            http,
        } => {
            if http {
                let stages = HttpStageExecutor::from_config(&config.stages)
                    .context("failed to build HTTP stage client")?;
                run_one(stages, &config, &document, &batch).await
            } else {
                let mut stages = SimulatedStages::realistic();
                if let Some(stage) = fail_at {
                    stages = stages.failing_at(stage.into(), error);
                }
                run_one(stages, &config, &document, &batch).await
            }
        }
        Command::Demo { documents } => demo(&config, documents).await,
        Command::Schedule {
            interval,
            max,
            service,
            endpoint,
            method,
            data,
        } => {
            let target = Target {
                service,
                endpoint,
                method: method.into(),
            };
            schedule(&config, &interval, max, target, cli::job_data(&data)).await
        }
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_one<E: StageExecutor>(
    stages: E,
    config: &CaptureConfig,
    document: &str,
    batch: &str,
) -> Result<()> {
    let orchestrator = WorkflowOrchestrator::from_config(stages, config);
    let submitted = orchestrator.start(document, batch)?;
    let id = submitted.id();

    let mut progress = WorkflowProgress::start(&submitted.handle.snapshot(), None);
    let job = follow(&orchestrator, &id, &mut progress).await?;
    ui::print_workflow(&job);
    Ok(())
}

async fn follow<E: StageExecutor>(
    orchestrator: &WorkflowOrchestrator<E>,
    id: &JobId,
    progress: &mut WorkflowProgress,
) -> Result<WorkflowJob> {
    loop {
        let job = orchestrator.get(id)?;
        if job.status.is_terminal() {
            progress.finish(&job);
            return Ok(job);
        }
        progress.update(&job);
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Runs several documents in parallel. The second one is cancelled once its
/// OCR step is underway and the last one fails during extraction.
async fn demo(config: &CaptureConfig, documents: usize) -> Result<()> {
    let documents = documents.max(1);
    let healthy = WorkflowOrchestrator::from_config(SimulatedStages::realistic(), config);
    let failing = WorkflowOrchestrator::from_config(
        SimulatedStages::realistic().failing_at(StepType::Extraction, "extraction timeout"),
        config,
    );

    let multi = MultiProgress::new();
    let mut running = Vec::new();
    for n in 1..=documents {
        let orchestrator = if n == documents && n > 1 { &failing } else { &healthy };
        let submitted = orchestrator.start(&format!("DOC-{n:03}"), "demo-batch")?;
        let progress = WorkflowProgress::start(&submitted.handle.snapshot(), Some(&multi));
        running.push((orchestrator, submitted.id(), progress));
    }

    let mut to_cancel = (documents >= 3).then(|| running[1].1);
    let mut finished: HashSet<JobId> = HashSet::new();

    while finished.len() < running.len() {
        for (orchestrator, id, progress) in &mut running {
            let id = *id;
            if finished.contains(&id) {
                continue;
            }
            let job = orchestrator.get(&id)?;
            if to_cancel == Some(id) && job.step(StepType::Ocr).status == StepStatus::Processing {
                orchestrator.cancel(&id)?;
                to_cancel = None;
                continue;
            }
            if job.status.is_terminal() {
                progress.finish(&job);
                finished.insert(id);
            } else {
                progress.update(&job);
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

async fn schedule(
    config: &CaptureConfig,
    interval: &str,
    max: Option<u32>,
    target: Target,
    data: Parameters,
) -> Result<()> {
    let invoker =
        HttpInvoker::from_config(&config.scheduler).context("failed to build HTTP client")?;
    let timer = TimerService::new(TokioScheduler::new(invoker));
    let job = timer
        .create_simple("cli-trigger", "cli", interval, target, max, data)
        .await?;
    println!("scheduled {} every {interval}", job.id);
    ui::print_schedule(&job);

    let mut last_count = job.execution_count;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                timer.stop(&job.id).await?;
                ui::print_schedule(&timer.get(&job.id)?);
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        let current = timer.get(&job.id)?;
        if current.execution_count != last_count {
            last_count = current.execution_count;
            ui::print_schedule(&current);
        }
        if matches!(
            current.status,
            ScheduleStatus::Completed | ScheduleStatus::Error
        ) {
            ui::print_schedule(&current);
            return Ok(());
        }
    }
}
