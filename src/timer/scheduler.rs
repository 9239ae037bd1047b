//! The scheduling engine behind [`TimerService`](super::TimerService).
//!
//! [`TokioScheduler`] runs one task per scheduled job. The task sleeps until
//! the next fire time, invokes the target and reports the execution back on
//! the job record, until the trigger is used up or the job is unscheduled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::invoker::TargetInvoker;
use super::job::{ScheduledHandle, TriggerSpec};
use crate::error::ScheduleError;
use crate::jobs::JobId;

/// Engine that fires scheduled jobs and records each execution on the job.
pub trait SchedulerBackend: Send + Sync + 'static {
    /// Starts firing `job` according to its trigger, replacing any previous
    /// schedule for the same id.
    fn schedule(&self, job: ScheduledHandle)
    -> impl Future<Output = Result<(), ScheduleError>> + Send;

    fn pause(&self, id: JobId) -> impl Future<Output = Result<(), ScheduleError>> + Send;

    fn resume(&self, id: JobId) -> impl Future<Output = Result<(), ScheduleError>> + Send;

    /// Stops all future firings. Unknown ids are ignored.
    fn unschedule(&self, id: JobId) -> impl Future<Output = Result<(), ScheduleError>> + Send;

    /// Fires `job` once, outside its regular schedule.
    fn trigger_now(
        &self,
        job: ScheduledHandle,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send;
}

struct ActiveTrigger {
    paused: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// In-process [`SchedulerBackend`] on the tokio timer.
pub struct TokioScheduler<I> {
    invoker: Arc<I>,
    triggers: Mutex<HashMap<JobId, ActiveTrigger>>,
}

impl<I: TargetInvoker> TokioScheduler<I> {
    pub fn new(invoker: I) -> Self {
        Self {
            invoker: Arc::new(invoker),
            triggers: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a firing task for `id` is still alive.
    pub fn is_scheduled(&self, id: &JobId) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|trigger| !trigger.task.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, ActiveTrigger>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_paused(&self, id: JobId, paused: bool) -> Result<(), ScheduleError> {
        let triggers = self.lock();
        let trigger = triggers
            .get(&id)
            .ok_or_else(|| ScheduleError::Backend(format!("no trigger registered for {id}")))?;
        trigger.paused.send_replace(paused);
        Ok(())
    }
}

fn runtime() -> Result<RuntimeHandle, ScheduleError> {
    RuntimeHandle::try_current()
        .map_err(|_| ScheduleError::Backend("no async runtime available".to_string()))
}

impl<I: TargetInvoker> SchedulerBackend for TokioScheduler<I> {
    async fn schedule(&self, job: ScheduledHandle) -> Result<(), ScheduleError> {
        let runtime = runtime()?;
        let id = job.id();
        let (paused, paused_rx) = watch::channel(false);
        let task = runtime.spawn(run_trigger(job, Arc::clone(&self.invoker), paused_rx));

        if let Some(previous) = self.lock().insert(id, ActiveTrigger { paused, task }) {
            previous.task.abort();
        }
        Ok(())
    }

    async fn pause(&self, id: JobId) -> Result<(), ScheduleError> {
        self.set_paused(id, true)
    }

    async fn resume(&self, id: JobId) -> Result<(), ScheduleError> {
        self.set_paused(id, false)
    }

    async fn unschedule(&self, id: JobId) -> Result<(), ScheduleError> {
        if let Some(trigger) = self.lock().remove(&id) {
            trigger.task.abort();
        }
        Ok(())
    }

    async fn trigger_now(&self, job: ScheduledHandle) -> Result<(), ScheduleError> {
        let runtime = runtime()?;
        job.with(|j| {
            if j.begin_firing() {
                Ok(())
            } else {
                Err(ScheduleError::InvalidState {
                    id: j.id,
                    status: j.status,
                    action: "trigger",
                })
            }
        })?;
        let invoker = Arc::clone(&self.invoker);
        runtime.spawn(async move {
            fire(&job, invoker.as_ref()).await;
        });
        Ok(())
    }
}

impl<I> Drop for TokioScheduler<I> {
    fn drop(&mut self) {
        let triggers = self.triggers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for trigger in triggers.values() {
            trigger.task.abort();
        }
    }
}

async fn run_trigger<I: TargetInvoker>(
    job: ScheduledHandle,
    invoker: Arc<I>,
    mut paused: watch::Receiver<bool>,
) {
    let id = job.id();
    let trigger = job.with(|j| j.trigger.clone());

    loop {
        let now = Utc::now();
        let next = job.with(|j| {
            let next = trigger.next_after(now);
            j.next_fire_time = next;
            next
        });
        let Some(next) = next else {
            job.with(|j| j.finish());
            tracing::info!(job_id = %id, "trigger has no further occurrences");
            return;
        };

        let wait = match &trigger {
            TriggerSpec::Simple { every, .. } => *every,
            _ => (next - now).to_std().unwrap_or_default(),
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = paused.wait_for(|p| *p) => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let is_paused = *paused.borrow_and_update();
        if is_paused {
            let resumed = paused.wait_for(|p| !*p).await.is_ok();
            if !resumed {
                return;
            }
            continue;
        }

        if !job.with(|j| j.status.can_fire() && j.begin_firing()) {
            return;
        }
        if fire(&job, invoker.as_ref()).await {
            tracing::info!(job_id = %id, "scheduled job completed");
            return;
        }
    }
}

/// Runs one firing reserved with
/// [`begin_firing`](super::ScheduledJob::begin_firing). Returns `true` when
/// the job is Completed afterwards.
async fn fire<I: TargetInvoker>(job: &ScheduledHandle, invoker: &I) -> bool {
    let mut reservation = Reservation { job, recorded: false };
    let (target, job_data) = job.with(|j| (j.target.clone(), j.job_data.clone()));
    let fired_at = Utc::now();

    tracing::info!(
        job_id = %job.id(),
        service = %target.service,
        endpoint = %target.endpoint,
        "firing scheduled job"
    );
    let outcome = invoker.invoke(&target, &job_data).await;
    if let Some(error) = outcome.error() {
        tracing::warn!(job_id = %job.id(), error, "scheduled target failed");
    }

    reservation.recorded = true;
    job.with(|j| j.record_execution(fired_at, &outcome))
}

/// Releases an unrecorded firing when its task is aborted mid-call.
struct Reservation<'a> {
    job: &'a ScheduledHandle,
    recorded: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.job.with(|j| j.release_firing());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::jobs::{Handle, Parameters};
    use crate::outcome::Outcome;
    use crate::timer::{ScheduleStatus, ScheduledJob, Target};

    struct ChannelInvoker(mpsc::UnboundedSender<Parameters>);

    impl TargetInvoker for ChannelInvoker {
        async fn invoke(&self, _target: &Target, job_data: &Parameters) -> Outcome<String> {
            let _ = self.0.send(job_data.clone());
            Outcome::success("200 OK".to_string())
        }
    }

    fn scheduler() -> (TokioScheduler<ChannelInvoker>, mpsc::UnboundedReceiver<Parameters>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TokioScheduler::new(ChannelInvoker(tx)), rx)
    }

    fn handle(trigger: TriggerSpec) -> ScheduledHandle {
        let mut job = ScheduledJob::new(
            "reindex",
            "ocr",
            trigger,
            Target::post("ocr-service", "/api/ocr/reindex"),
            Parameters::new(),
        )
        .unwrap();
        job.activate();
        Handle::new(job)
    }

    #[tokio::test(start_paused = true)]
    async fn once_in_the_past_fires_immediately() {
        let (scheduler, mut fired) = scheduler();
        let job = handle(TriggerSpec::once(Utc::now() - chrono::Duration::minutes(5)));

        scheduler.schedule(job.clone()).await.unwrap();
        fired.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, ScheduleStatus::Completed);
        assert_eq!(snapshot.execution_count, 1);
        assert!(!scheduler.is_scheduled(&job.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_trigger_does_not_fire() {
        let (scheduler, mut fired) = scheduler();
        let job = handle(TriggerSpec::simple("10s", None).unwrap());
        let id = job.id();

        scheduler.schedule(job.clone()).await.unwrap();
        scheduler.pause(id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(fired.try_recv().is_err());
        assert_eq!(job.snapshot().execution_count, 0);

        scheduler.resume(id).await.unwrap();
        fired.recv().await.unwrap();
        assert!(scheduler.is_scheduled(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_stops_firing() {
        let (scheduler, mut fired) = scheduler();
        let job = handle(TriggerSpec::simple("10s", None).unwrap());
        let id = job.id();

        scheduler.schedule(job.clone()).await.unwrap();
        fired.recv().await.unwrap();
        scheduler.unschedule(id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(fired.try_recv().is_err());
        assert!(!scheduler.is_scheduled(&id));
        assert!(scheduler.pause(id).await.is_err());
    }

    #[tokio::test]
    async fn trigger_now_fires_once() {
        let (scheduler, mut fired) = scheduler();
        let job = handle(TriggerSpec::cron("0 0 3 * * *").unwrap());

        scheduler.trigger_now(job.clone()).await.unwrap();
        fired.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = job.snapshot();
        assert_eq!(snapshot.execution_count, 1);
        assert_eq!(snapshot.status, ScheduleStatus::Running);
        assert_eq!(snapshot.last_execution_result.as_deref(), Some("200 OK"));
    }
}
