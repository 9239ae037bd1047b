use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::jobs::{Handle, JobId, Parameters, Tracked};
use crate::outcome::Outcome;

pub const DEFAULT_GROUP: &str = "DEFAULT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleStatus {
    Scheduled,
    Running,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl ScheduleStatus {
    /// Whether a trigger in this status may still fire on its own schedule.
    pub fn can_fire(self) -> bool {
        matches!(self, ScheduleStatus::Scheduled | ScheduleStatus::Running)
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Scheduled => write!(f, "SCHEDULED"),
            ScheduleStatus::Running => write!(f, "RUNNING"),
            ScheduleStatus::Paused => write!(f, "PAUSED"),
            ScheduleStatus::Stopped => write!(f, "STOPPED"),
            ScheduleStatus::Completed => write!(f, "COMPLETED"),
            ScheduleStatus::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    Cron,
    Simple,
    Once,
}

/// When a scheduled job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerSpec {
    /// Six or seven fields, seconds first: `sec min hour day month weekday [year]`.
    Cron { expression: String },
    /// Fires every `every`, at most `max_executions` times when set.
    Simple {
        interval: String,
        every: Duration,
        max_executions: Option<u32>,
    },
    Once { fire_at: DateTime<Utc> },
}

impl TriggerSpec {
    pub fn cron(expression: &str) -> Result<Self, ScheduleError> {
        parse_cron(expression)?;
        Ok(TriggerSpec::Cron {
            expression: expression.trim().to_string(),
        })
    }

    pub fn simple(interval: &str, max_executions: Option<u32>) -> Result<Self, ScheduleError> {
        let every = parse_interval(interval)?;
        if max_executions == Some(0) {
            return Err(ScheduleError::Validation(
                "max executions must be at least 1".to_string(),
            ));
        }
        Ok(TriggerSpec::Simple {
            interval: interval.trim().to_string(),
            every,
            max_executions,
        })
    }

    pub fn once(fire_at: DateTime<Utc>) -> Self {
        TriggerSpec::Once { fire_at }
    }

    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerSpec::Cron { .. } => TriggerType::Cron,
            TriggerSpec::Simple { .. } => TriggerType::Simple,
            TriggerSpec::Once { .. } => TriggerType::Once,
        }
    }

    /// Next fire time strictly after `now`, or `None` when the trigger has no
    /// further occurrences. A one-shot time already in the past is returned
    /// as-is so it fires immediately.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TriggerSpec::Cron { expression } => parse_cron(expression).ok()?.after(&now).next(),
            TriggerSpec::Simple { every, .. } => {
                chrono::Duration::from_std(*every).ok().map(|every| now + every)
            }
            TriggerSpec::Once { fire_at } => Some(*fire_at),
        }
    }
}

fn parse_cron(expression: &str) -> Result<cron::Schedule, ScheduleError> {
    cron::Schedule::from_str(expression.trim()).map_err(|e| {
        ScheduleError::Validation(format!("invalid cron expression '{expression}': {e}"))
    })
}

/// Parses `<n>s`, `<n>m`, `<n>h` or `<n>d` with `n >= 1`.
pub fn parse_interval(interval: &str) -> Result<Duration, ScheduleError> {
    let invalid = || {
        ScheduleError::Validation(format!(
            "invalid interval '{interval}': expected <n>s, <n>m, <n>h or <n>d with n >= 1"
        ))
    };

    let trimmed = interval.trim();
    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }

    let unit_secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// The service endpoint a scheduled job calls when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Host and optional port, e.g. `export-service:5005`.
    pub service: String,
    /// Path appended to the service, e.g. `/api/export/flush`.
    pub endpoint: String,
    pub method: HttpMethod,
}

impl Target {
    pub fn post(service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            method: HttpMethod::Post,
        }
    }

    pub fn get(service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            ..Self::post(service, endpoint)
        }
    }

    pub fn url(&self, scheme: &str) -> String {
        format!("{scheme}://{}{}", self.service, self.endpoint)
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        if self.service.trim().is_empty() {
            return Err(ScheduleError::Validation(
                "target service is required".to_string(),
            ));
        }
        if !self.endpoint.is_empty() && !self.endpoint.starts_with('/') {
            return Err(ScheduleError::Validation(format!(
                "target endpoint must start with '/': {}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// A recurring or one-off call to a target service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub group: String,
    pub trigger: TriggerSpec,
    pub target: Target,
    /// Sent unchanged with every firing.
    pub job_data: Parameters,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub last_fire_time: Option<DateTime<Utc>>,
    pub execution_count: u32,
    pub last_execution_result: Option<String>,
    /// Firings reserved by [`ScheduledJob::begin_firing`] and not yet recorded.
    #[serde(skip)]
    in_flight: u32,
}

impl ScheduledJob {
    pub fn new(
        name: &str,
        group: &str,
        trigger: TriggerSpec,
        target: Target,
        job_data: Parameters,
    ) -> Result<Self, ScheduleError> {
        if name.trim().is_empty() {
            return Err(ScheduleError::Validation("job name is required".to_string()));
        }
        target.validate()?;

        let now = Utc::now();
        let group = if group.trim().is_empty() {
            DEFAULT_GROUP
        } else {
            group
        };
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            group: group.to_string(),
            next_fire_time: trigger.next_after(now),
            trigger,
            target,
            job_data,
            status: ScheduleStatus::Scheduled,
            created_at: now,
            start_date: now,
            last_fire_time: None,
            execution_count: 0,
            last_execution_result: None,
            in_flight: 0,
        })
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.trigger.trigger_type()
    }

    /// Moves to Running. A completed job stays completed.
    pub fn activate(&mut self) -> bool {
        if matches!(
            self.status,
            ScheduleStatus::Running | ScheduleStatus::Completed
        ) {
            return false;
        }
        self.status = ScheduleStatus::Running;
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.status != ScheduleStatus::Running {
            return false;
        }
        self.status = ScheduleStatus::Paused;
        self.next_fire_time = None;
        true
    }

    pub fn stop(&mut self) -> bool {
        if matches!(
            self.status,
            ScheduleStatus::Stopped | ScheduleStatus::Completed
        ) {
            return false;
        }
        self.status = ScheduleStatus::Stopped;
        self.next_fire_time = None;
        true
    }

    pub fn mark_error(&mut self, error: impl Into<String>) -> bool {
        if self.status == ScheduleStatus::Completed {
            return false;
        }
        self.status = ScheduleStatus::Error;
        self.next_fire_time = None;
        self.last_execution_result = Some(error.into());
        true
    }

    /// The trigger has no occurrences left.
    pub fn finish(&mut self) -> bool {
        if matches!(
            self.status,
            ScheduleStatus::Stopped | ScheduleStatus::Completed | ScheduleStatus::Error
        ) {
            return false;
        }
        self.status = ScheduleStatus::Completed;
        self.next_fire_time = None;
        true
    }

    /// Reserves one firing. Refuses once the job is Completed or when the
    /// firings already counted or under way use up the trigger.
    pub fn begin_firing(&mut self) -> bool {
        if self.status == ScheduleStatus::Completed {
            return false;
        }
        let limit = match &self.trigger {
            TriggerSpec::Once { .. } => Some(1),
            TriggerSpec::Simple { max_executions, .. } => *max_executions,
            TriggerSpec::Cron { .. } => None,
        };
        if limit.is_some_and(|max| self.execution_count + self.in_flight >= max) {
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Drops a reservation whose firing never ran to completion.
    pub fn release_firing(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Number of reserved firings whose target call has not returned.
    pub fn firings_in_flight(&self) -> u32 {
        self.in_flight
    }

    /// Records one firing and completes the job once its trigger is used up.
    /// Returns `true` when the job is Completed afterwards.
    pub fn record_execution(
        &mut self,
        fired_at: DateTime<Utc>,
        outcome: &Outcome<String>,
    ) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.status == ScheduleStatus::Completed {
            return true;
        }

        self.last_fire_time = Some(fired_at);
        self.execution_count += 1;
        self.last_execution_result = Some(match outcome {
            Outcome::Success(value) => value.clone(),
            Outcome::Failure(errors) => format!("failed: {}", errors.join("; ")),
        });

        let exhausted = match &self.trigger {
            TriggerSpec::Once { .. } => true,
            TriggerSpec::Simple {
                max_executions: Some(max),
                ..
            } => self.execution_count >= *max,
            _ => false,
        };
        if exhausted {
            self.finish();
        }
        self.status == ScheduleStatus::Completed
    }
}

impl Tracked for ScheduledJob {
    type Status = ScheduleStatus;

    fn id(&self) -> JobId {
        self.id
    }

    fn status(&self) -> ScheduleStatus {
        self.status
    }

    fn is_terminal(&self) -> bool {
        self.status == ScheduleStatus::Completed
    }

    fn fault(&mut self, error: String) -> bool {
        self.mark_error(error)
    }
}

pub type ScheduledHandle = Handle<ScheduledJob>;
