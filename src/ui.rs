//! Terminal rendering for the command-line driver.
//!
//! [`WorkflowProgress`] draws one progress bar per workflow with `indicatif`
//! and prints step transitions in colour with `console`.

use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use captureflow::timer::{ScheduleStatus, ScheduledJob};
use captureflow::workflow::{StepStatus, WorkflowJob, WorkflowStatus};

/// Visual progress of one workflow.
pub struct WorkflowProgress {
    pb: ProgressBar,
    label: String,
    seen: Vec<StepStatus>,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WorkflowProgress {
    /// Starts a bar for `job`, attached to `multi` when several workflows
    /// are rendered together.
    pub fn start(job: &WorkflowJob, multi: Option<&MultiProgress>) -> Self {
        let pb = ProgressBar::new(job.steps().len() as u64);
        let pb = match multi {
            Some(multi) => multi.add(pb),
            None => pb,
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {prefix:.bold} [{bar:20.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_prefix(job.document_id.clone());
        pb.set_message(job.status.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            label: job.document_id.clone(),
            seen: job.steps().iter().map(|s| s.status).collect(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Renders whatever changed since the last snapshot.
    pub fn update(&mut self, job: &WorkflowJob) {
        for (step, seen) in job.steps().iter().zip(self.seen.iter_mut()) {
            if step.status == *seen {
                continue;
            }
            *seen = step.status;
            match step.status {
                StepStatus::Processing => {
                    self.pb.set_message(format!("{}...", step.step_type));
                }
                StepStatus::Completed => {
                    self.pb.inc(1);
                    self.pb.println(format!(
                        "  {} {} {}: {}",
                        self.green.apply_to("✓"),
                        self.label,
                        step.step_type,
                        step.result.as_deref().unwrap_or_default()
                    ));
                }
                StepStatus::Failed => {
                    self.pb.println(format!(
                        "  {} {} {}: {}",
                        self.red.apply_to("✗"),
                        self.label,
                        step.step_type,
                        step.error_message.as_deref().unwrap_or("unknown error")
                    ));
                }
                StepStatus::Pending | StepStatus::Skipped => {}
            }
        }
    }

    /// Stops the bar and prints the final status.
    pub fn finish(&mut self, job: &WorkflowJob) {
        self.update(job);
        let mark = match job.status {
            WorkflowStatus::Completed => self.green.apply_to("✓"),
            WorkflowStatus::Failed => self.red.apply_to("✗"),
            _ => self.yellow.apply_to("■"),
        };
        let detail = job
            .error_message
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default();
        self.pb.finish_with_message(job.status.to_string());
        self.pb
            .println(format!("  {mark} {} {}{detail}", self.label, job.status));
    }
}

/// Prints the workflow snapshot as JSON.
pub fn print_workflow(job: &WorkflowJob) {
    let style = match job.status {
        WorkflowStatus::Completed => Style::new().green().bold(),
        WorkflowStatus::Failed => Style::new().red().bold(),
        _ => Style::new().yellow(),
    };
    println!();
    println!("{}", style.apply_to("─── Workflow ───"));
    println!("{}", serde_json::to_string_pretty(job).unwrap_or_default());
}

/// One-line status of a scheduled job.
pub fn print_schedule(job: &ScheduledJob) {
    let style = match job.status {
        ScheduleStatus::Completed => Style::new().green().bold(),
        ScheduleStatus::Error => Style::new().red().bold(),
        _ => Style::new().cyan(),
    };
    let next = job
        .next_fire_time
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {} {} runs={} next={next} last={}",
        style.apply_to(job.status),
        job.name,
        job.execution_count,
        job.last_execution_result.as_deref().unwrap_or("-")
    );
}
