//! Scheduled jobs: cron, fixed-interval and one-shot triggers that call a
//! target service when they fire.
//!
//! [`TimerService`] owns the job records and enforces the status rules; the
//! firing itself is delegated to a [`SchedulerBackend`].

mod invoker;
mod job;
mod scheduler;

use chrono::{DateTime, Utc};

use crate::error::ScheduleError;
use crate::jobs::{JobId, JobRegistry, Parameters};

pub use invoker::{HttpInvoker, TargetInvoker};
pub use job::{
    DEFAULT_GROUP, HttpMethod, ScheduleStatus, ScheduledHandle, ScheduledJob, Target, TriggerSpec,
    TriggerType, parse_interval,
};
pub use scheduler::{SchedulerBackend, TokioScheduler};

pub struct TimerService<B: SchedulerBackend> {
    registry: JobRegistry<ScheduledJob>,
    backend: B,
}

impl<B: SchedulerBackend> TimerService<B> {
    pub fn new(backend: B) -> Self {
        Self {
            registry: JobRegistry::new(),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn create_cron(
        &self,
        name: &str,
        group: &str,
        expression: &str,
        target: Target,
        job_data: Parameters,
    ) -> Result<ScheduledJob, ScheduleError> {
        let trigger = TriggerSpec::cron(expression)?;
        self.create(name, group, trigger, target, job_data).await
    }

    /// `interval` is `<n>s`, `<n>m`, `<n>h` or `<n>d`. With `max_executions`
    /// set the job completes after that many firings.
    pub async fn create_simple(
        &self,
        name: &str,
        group: &str,
        interval: &str,
        target: Target,
        max_executions: Option<u32>,
        job_data: Parameters,
    ) -> Result<ScheduledJob, ScheduleError> {
        let trigger = TriggerSpec::simple(interval, max_executions)?;
        self.create(name, group, trigger, target, job_data).await
    }

    pub async fn create_once(
        &self,
        name: &str,
        group: &str,
        fire_at: DateTime<Utc>,
        target: Target,
        job_data: Parameters,
    ) -> Result<ScheduledJob, ScheduleError> {
        self.create(name, group, TriggerSpec::once(fire_at), target, job_data)
            .await
    }

    async fn create(
        &self,
        name: &str,
        group: &str,
        trigger: TriggerSpec,
        target: Target,
        job_data: Parameters,
    ) -> Result<ScheduledJob, ScheduleError> {
        let handle = self
            .registry
            .register(ScheduledJob::new(name, group, trigger, target, job_data)?);
        let id = handle.id();

        if let Err(e) = self.backend.schedule(handle.clone()).await {
            handle.with(|job| job.mark_error(e.to_string()));
            tracing::error!(job_id = %id, name, error = %e, "failed to schedule job");
            return Err(e);
        }

        handle.with(ScheduledJob::activate);
        let job = handle.snapshot();
        tracing::info!(
            job_id = %id,
            name,
            group = %job.group,
            trigger = ?job.trigger_type(),
            "scheduled job created"
        );
        Ok(job)
    }

    /// Resumes a paused job or reschedules a stopped one. Already running is
    /// fine; a completed job cannot be restarted.
    pub async fn start(&self, id: &JobId) -> Result<(), ScheduleError> {
        let handle = self.handle(id)?;
        match handle.status() {
            ScheduleStatus::Running => return Ok(()),
            ScheduleStatus::Completed => {
                return Err(ScheduleError::InvalidState {
                    id: *id,
                    status: ScheduleStatus::Completed,
                    action: "start",
                });
            }
            ScheduleStatus::Paused => self.backend.resume(*id).await?,
            ScheduleStatus::Scheduled | ScheduleStatus::Stopped | ScheduleStatus::Error => {
                self.backend.schedule(handle.clone()).await?
            }
        }
        handle.with(ScheduledJob::activate);
        tracing::info!(job_id = %id, "scheduled job started");
        Ok(())
    }

    pub async fn pause(&self, id: &JobId) -> Result<(), ScheduleError> {
        let handle = self.handle(id)?;
        let status = handle.status();
        if status != ScheduleStatus::Running {
            return Err(ScheduleError::InvalidState {
                id: *id,
                status,
                action: "pause",
            });
        }
        self.backend.pause(*id).await?;
        handle.with(ScheduledJob::pause);
        tracing::info!(job_id = %id, "scheduled job paused");
        Ok(())
    }

    /// Unschedules the job but keeps its record. Restart with [`start`](Self::start).
    pub async fn stop(&self, id: &JobId) -> Result<(), ScheduleError> {
        let handle = self.handle(id)?;
        match handle.status() {
            ScheduleStatus::Stopped => return Ok(()),
            ScheduleStatus::Completed => {
                return Err(ScheduleError::InvalidState {
                    id: *id,
                    status: ScheduleStatus::Completed,
                    action: "stop",
                });
            }
            _ => {}
        }
        self.backend.unschedule(*id).await?;
        handle.with(ScheduledJob::stop);
        tracing::info!(job_id = %id, "scheduled job stopped");
        Ok(())
    }

    pub async fn delete(&self, id: &JobId) -> Result<(), ScheduleError> {
        self.handle(id)?;
        self.backend.unschedule(*id).await?;
        self.registry.remove(id);
        tracing::info!(job_id = %id, "scheduled job deleted");
        Ok(())
    }

    /// Fires the job once right away. Does not change its schedule.
    pub async fn trigger_now(&self, id: &JobId) -> Result<(), ScheduleError> {
        let handle = self.handle(id)?;
        let status = handle.status();
        if matches!(status, ScheduleStatus::Completed | ScheduleStatus::Stopped) {
            return Err(ScheduleError::InvalidState {
                id: *id,
                status,
                action: "trigger",
            });
        }
        self.backend.trigger_now(handle).await?;
        tracing::info!(job_id = %id, "scheduled job triggered manually");
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Result<ScheduledJob, ScheduleError> {
        Ok(self.handle(id)?.snapshot())
    }

    pub fn list_all(&self) -> Vec<ScheduledJob> {
        self.registry
            .list()
            .into_iter()
            .map(|handle| handle.snapshot())
            .collect()
    }

    pub fn list_by_status(&self, status: ScheduleStatus) -> Vec<ScheduledJob> {
        self.registry
            .list_by_status(status)
            .into_iter()
            .map(|handle| handle.snapshot())
            .filter(|job| job.status == status)
            .collect()
    }

    fn handle(&self, id: &JobId) -> Result<ScheduledHandle, ScheduleError> {
        self.registry.get(id).ok_or(ScheduleError::NotFound(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::jobs::ParamValue;
    use crate::outcome::Outcome;

    /// Records every firing.
    #[derive(Clone, Default)]
    struct RecordingInvoker {
        calls: Arc<Mutex<Vec<(Target, Parameters)>>>,
    }

    impl RecordingInvoker {
        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl TargetInvoker for RecordingInvoker {
        async fn invoke(&self, target: &Target, job_data: &Parameters) -> Outcome<String> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), job_data.clone()));
            Outcome::success("200 OK".to_string())
        }
    }

    struct FailingInvoker;

    impl TargetInvoker for FailingInvoker {
        async fn invoke(&self, _target: &Target, _job_data: &Parameters) -> Outcome<String> {
            Outcome::failure("connection refused")
        }
    }

    /// Answers after a delay, recording each call as it starts.
    #[derive(Clone, Default)]
    struct SlowInvoker {
        calls: Arc<Mutex<usize>>,
    }

    impl TargetInvoker for SlowInvoker {
        async fn invoke(&self, _target: &Target, _job_data: &Parameters) -> Outcome<String> {
            *self.calls.lock().unwrap() += 1;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Outcome::success("200 OK".to_string())
        }
    }

    /// An engine that rejects every request.
    struct BrokenBackend;

    impl SchedulerBackend for BrokenBackend {
        async fn schedule(&self, _job: ScheduledHandle) -> Result<(), ScheduleError> {
            Err(ScheduleError::Backend("scheduler is shut down".to_string()))
        }
        async fn pause(&self, _id: JobId) -> Result<(), ScheduleError> {
            Ok(())
        }
        async fn resume(&self, _id: JobId) -> Result<(), ScheduleError> {
            Ok(())
        }
        async fn unschedule(&self, _id: JobId) -> Result<(), ScheduleError> {
            Ok(())
        }
        async fn trigger_now(&self, _job: ScheduledHandle) -> Result<(), ScheduleError> {
            Ok(())
        }
    }

    fn service() -> (TimerService<TokioScheduler<RecordingInvoker>>, RecordingInvoker) {
        let invoker = RecordingInvoker::default();
        (
            TimerService::new(TokioScheduler::new(invoker.clone())),
            invoker,
        )
    }

    fn target() -> Target {
        Target::post("export-service:5005", "/api/export/purge")
    }

    fn job_data() -> Parameters {
        let mut data = Parameters::new();
        data.insert("batchId".to_string(), ParamValue::from("B1"));
        data.insert("retentionDays".to_string(), ParamValue::from(30_i64));
        data
    }

    #[tokio::test(start_paused = true)]
    async fn simple_trigger_stops_after_max_executions() {
        let (timer, invoker) = service();
        let job = timer
            .create_simple("purge", "export", "30s", target(), Some(3), job_data())
            .await
            .unwrap();
        assert_eq!(job.status, ScheduleStatus::Running);
        assert_eq!(job.trigger_type(), TriggerType::Simple);

        tokio::time::sleep(Duration::from_secs(65)).await;
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(snapshot.execution_count, 2);
        assert_eq!(snapshot.status, ScheduleStatus::Running);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(snapshot.execution_count, 3);
        assert_eq!(snapshot.status, ScheduleStatus::Completed);
        assert!(snapshot.next_fire_time.is_none());
        assert!(snapshot.last_fire_time.is_some());
        assert!(!timer.backend().is_scheduled(&job.id));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(invoker.count(), 3);
        assert_eq!(timer.get(&job.id).unwrap().execution_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn job_data_is_passed_unchanged_to_every_firing() {
        let (timer, invoker) = service();
        let job = timer
            .create_simple("purge", "export", "1m", target(), Some(2), job_data())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(150)).await;
        let calls = invoker.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        for (called, data) in calls {
            assert_eq!(called, target());
            assert_eq!(data, job_data());
        }
        assert_eq!(timer.get(&job.id).unwrap().job_data, job_data());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_firings_keep_the_job_running() {
        let timer = TimerService::new(TokioScheduler::new(FailingInvoker));
        let job = timer
            .create_simple("ping", "", "10s", target(), None, Parameters::new())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(snapshot.status, ScheduleStatus::Running);
        assert_eq!(snapshot.execution_count, 2);
        assert_eq!(
            snapshot.last_execution_result.as_deref(),
            Some("failed: connection refused")
        );
    }

    #[tokio::test]
    async fn invalid_requests_create_nothing() {
        let (timer, _) = service();
        let bad_interval = timer
            .create_simple("purge", "export", "30x", target(), None, Parameters::new())
            .await;
        assert!(matches!(bad_interval, Err(ScheduleError::Validation(_))));

        let bad_cron = timer
            .create_cron("nightly", "export", "at midnight", target(), Parameters::new())
            .await;
        assert!(matches!(bad_cron, Err(ScheduleError::Validation(_))));

        let no_name = timer
            .create_once("", "export", Utc::now(), target(), Parameters::new())
            .await;
        assert!(matches!(no_name, Err(ScheduleError::Validation(_))));

        assert!(timer.list_all().is_empty());
    }

    #[tokio::test]
    async fn cron_job_is_running_with_next_fire_time() {
        let (timer, invoker) = service();
        let job = timer
            .create_cron("nightly", "export", "0 0 2 * * *", target(), Parameters::new())
            .await
            .unwrap();

        assert_eq!(job.status, ScheduleStatus::Running);
        assert!(job.next_fire_time.unwrap() > Utc::now());
        assert_eq!(timer.list_by_status(ScheduleStatus::Running).len(), 1);
        assert_eq!(invoker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn once_job_fires_and_completes() {
        let (timer, invoker) = service();
        let job = timer
            .create_once("reindex", "ocr", Utc::now(), target(), job_data())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(snapshot.status, ScheduleStatus::Completed);
        assert_eq!(snapshot.execution_count, 1);
        assert_eq!(invoker.count(), 1);

        assert_eq!(
            timer.start(&job.id).await,
            Err(ScheduleError::InvalidState {
                id: job.id,
                status: ScheduleStatus::Completed,
                action: "start"
            })
        );
        assert!(matches!(
            timer.trigger_now(&job.id).await,
            Err(ScheduleError::InvalidState { action: "trigger", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_start_resume_firing() {
        let (timer, invoker) = service();
        let job = timer
            .create_simple("purge", "export", "10s", target(), None, Parameters::new())
            .await
            .unwrap();

        timer.pause(&job.id).await.unwrap();
        assert_eq!(timer.get(&job.id).unwrap().status, ScheduleStatus::Paused);
        assert!(matches!(
            timer.pause(&job.id).await,
            Err(ScheduleError::InvalidState { action: "pause", .. })
        ));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(invoker.count(), 0);
        assert!(timer.get(&job.id).unwrap().next_fire_time.is_none());

        timer.start(&job.id).await.unwrap();
        assert_eq!(timer.get(&job.id).unwrap().status, ScheduleStatus::Running);
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(invoker.count(), 1);
        assert!(timer.get(&job.id).unwrap().next_fire_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_firing_counts_toward_max_executions() {
        let (timer, invoker) = service();
        let job = timer
            .create_simple("purge", "export", "30s", target(), Some(2), Parameters::new())
            .await
            .unwrap();

        timer.trigger_now(&job.id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(timer.get(&job.id).unwrap().execution_count, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(snapshot.execution_count, 2);
        assert_eq!(snapshot.status, ScheduleStatus::Completed);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(invoker.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_firing_cannot_overrun_a_firing_under_way() {
        let invoker = SlowInvoker::default();
        let timer = TimerService::new(TokioScheduler::new(invoker.clone()));
        let job = timer
            .create_simple("purge", "export", "30s", target(), Some(1), Parameters::new())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(timer.get(&job.id).unwrap().status, ScheduleStatus::Running);
        assert!(matches!(
            timer.trigger_now(&job.id).await,
            Err(ScheduleError::InvalidState { action: "trigger", .. })
        ));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(*invoker.calls.lock().unwrap(), 1);
        assert_eq!(snapshot.execution_count, 1);
        assert_eq!(snapshot.status, ScheduleStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_start_reschedules() {
        let (timer, invoker) = service();
        let job = timer
            .create_simple("purge", "export", "10s", target(), None, Parameters::new())
            .await
            .unwrap();

        timer.stop(&job.id).await.unwrap();
        let stopped = timer.get(&job.id).unwrap();
        assert_eq!(stopped.status, ScheduleStatus::Stopped);
        assert!(stopped.next_fire_time.is_none());
        assert!(timer.stop(&job.id).await.is_ok());
        assert!(matches!(
            timer.trigger_now(&job.id).await,
            Err(ScheduleError::InvalidState { action: "trigger", .. })
        ));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(invoker.count(), 0);

        timer.start(&job.id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(invoker.count(), 1);
        assert_eq!(timer.get(&job.id).unwrap().status, ScheduleStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_now_fires_outside_schedule() {
        let (timer, invoker) = service();
        let job = timer
            .create_cron("nightly", "export", "0 0 2 * * *", target(), job_data())
            .await
            .unwrap();

        timer.trigger_now(&job.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(invoker.count(), 1);
        let snapshot = timer.get(&job.id).unwrap();
        assert_eq!(snapshot.execution_count, 1);
        assert_eq!(snapshot.status, ScheduleStatus::Running);
    }

    #[tokio::test]
    async fn delete_removes_and_unschedules() {
        let (timer, _) = service();
        let job = timer
            .create_simple("purge", "export", "1h", target(), None, Parameters::new())
            .await
            .unwrap();
        assert!(timer.backend().is_scheduled(&job.id));

        timer.delete(&job.id).await.unwrap();
        assert_eq!(timer.get(&job.id).unwrap_err(), ScheduleError::NotFound(job.id));
        assert!(!timer.backend().is_scheduled(&job.id));
        assert_eq!(
            timer.delete(&job.id).await,
            Err(ScheduleError::NotFound(job.id))
        );
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (timer, _) = service();
        let id = JobId::new_v4();
        assert_eq!(timer.start(&id).await, Err(ScheduleError::NotFound(id)));
        assert_eq!(timer.pause(&id).await, Err(ScheduleError::NotFound(id)));
        assert_eq!(timer.stop(&id).await, Err(ScheduleError::NotFound(id)));
        assert_eq!(timer.trigger_now(&id).await, Err(ScheduleError::NotFound(id)));
    }

    #[tokio::test]
    async fn backend_failure_marks_job_as_error() {
        let timer = TimerService::new(BrokenBackend);
        let result = timer
            .create_simple("purge", "export", "30s", target(), None, Parameters::new())
            .await;
        assert_eq!(
            result.unwrap_err(),
            ScheduleError::Backend("scheduler is shut down".to_string())
        );

        let errored = timer.list_by_status(ScheduleStatus::Error);
        assert_eq!(errored.len(), 1);
        assert_eq!(
            errored[0].last_execution_result.as_deref(),
            Some("Scheduling engine error: scheduler is shut down")
        );
    }
}
