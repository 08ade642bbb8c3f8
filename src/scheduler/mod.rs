//! Per-job timers and the run bookkeeping around each firing.
//!
//! The registry maps a job id to its cron timer and its load-balancer
//! counters. It is filled when this node becomes standalone-or-leader and
//! emptied when leadership is lost. Every firing ends in a trace; failures
//! raise an alert when the job has an alarm address, and matching sub-jobs
//! are fired in the background.

pub mod cron;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashSet;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

pub use self::cron::{CronEngine, FireFn, JobCron, next_fire_times, time_step, validate_cron};

use crate::cluster::{Replicator, Role};
use crate::dispatch::{DispatchOutcome, Dispatcher, JobBalancers, ScheduleContext};
use crate::error::{AppError, AppResult};
use crate::models::{
    EXECUTE_STATUS_FAILED, EXECUTE_STATUS_SUCCEED, Job, ScheduleType, Trace, Triggered,
};
use crate::repositories::TraceStore;
use crate::services::alerts::{AlertMessage, AlertService};
use crate::store::EntityStore;
use crate::utils::snowflake::IdGenerator;
use crate::utils::time::{format_secs, now_secs};

const RESULT_SUCCEEDED: &str = "succeeded";

struct Registration {
    cron: JobCron,
    balancers: Arc<JobBalancers>,
}

struct Inner {
    engine: CronEngine,
    registry: Mutex<HashMap<u64, Registration>>,
    /// Jobs with a compensating run in flight
    misfires: DashSet<u64>,
    replicator: Replicator,
    dispatcher: Dispatcher,
    role: Arc<Role>,
    ids: Arc<IdGenerator>,
    traces: Arc<dyn TraceStore>,
    alerts: AlertService,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        engine: CronEngine,
        replicator: Replicator,
        dispatcher: Dispatcher,
        role: Arc<Role>,
        ids: Arc<IdGenerator>,
        traces: Arc<dyn TraceStore>,
        alerts: AlertService,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                registry: Mutex::new(HashMap::new()),
                misfires: DashSet::new(),
                replicator,
                dispatcher,
                role,
                ids,
                traces,
                alerts,
            }),
        }
    }

    fn store(&self) -> &EntityStore {
        self.inner.replicator.store()
    }

    pub fn replicator(&self) -> &Replicator {
        &self.inner.replicator
    }

    pub fn role(&self) -> &Arc<Role> {
        &self.inner.role
    }

    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.inner.ids
    }

    // ------------------------------------------------------------ registry

    /// Register every stored job that is not registered yet and start the
    /// active ones. Returns the number started.
    pub async fn init_schedulers(&self) -> AppResult<usize> {
        let jobs = self.store().list_jobs()?;
        let mut started = 0;
        for job in jobs {
            if self.is_registered(job.id).await {
                continue;
            }
            if let Err(e) = self.add_scheduler(&job).await {
                tracing::error!(job_id = job.id, job = %job.name, error = %e, "failed to register job");
                continue;
            }
            if job.is_active() {
                match self.schedule_task(job.id).await {
                    Ok(()) => started += 1,
                    Err(e) => tracing::error!(job_id = job.id, error = %e, "failed to start job"),
                }
            }
        }
        tracing::info!(started, "schedulers initialised");
        self.scan_misfires();
        Ok(started)
    }

    /// Stop every timer and empty the registry.
    pub async fn delete_schedulers(&self) {
        let mut registry = self.inner.registry.lock().await;
        for (id, mut registration) in registry.drain() {
            if let Err(e) = registration.cron.stop(&self.inner.engine).await {
                tracing::warn!(job_id = id, error = %e, "failed to stop timer");
            }
        }
        tracing::info!("schedulers removed");
    }

    pub async fn is_registered(&self, id: u64) -> bool {
        self.inner.registry.lock().await.contains_key(&id)
    }

    pub async fn is_running(&self, id: u64) -> bool {
        self.inner
            .registry
            .lock()
            .await
            .get(&id)
            .is_some_and(|r| r.cron.is_running())
    }

    pub async fn registered_count(&self) -> usize {
        self.inner.registry.lock().await.len()
    }

    /// Register `job` with a stopped timer and fresh balancer counters. A
    /// previous registration is stopped and replaced.
    pub async fn add_scheduler(&self, job: &Job) -> AppResult<()> {
        let cron = JobCron::new(&job.cron)?;
        let mut registry = self.inner.registry.lock().await;
        if let Some(mut previous) = registry.remove(&job.id) {
            previous.cron.stop(&self.inner.engine).await?;
        }
        registry.insert(
            job.id,
            Registration {
                cron,
                balancers: Arc::new(JobBalancers::new()),
            },
        );
        tracing::info!(job_id = job.id, job = %job.name, "job registered");
        Ok(())
    }

    /// Start a registered job's timer, seeding its next fire time if the
    /// cursor has none.
    pub async fn schedule_task(&self, id: u64) -> AppResult<()> {
        let mut registry = self.inner.registry.lock().await;
        let registration = registry
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("scheduler", "job_id", id))?;

        let mut triggered = self.store().get_triggered(id)?;
        if triggered.next_time == 0 {
            triggered.next_time = registration.cron.next_time(&self.inner.engine).await;
            self.store().save_triggered(&triggered)?;
        }
        registration
            .cron
            .start(&self.inner.engine, self.fire_fn(id))
            .await?;
        tracing::info!(job_id = id, next_time = triggered.next_time, "job started");
        Ok(())
    }

    /// Stop the timer and clear the cursor.
    pub async fn suspend_task(&self, id: u64) -> AppResult<()> {
        {
            let mut registry = self.inner.registry.lock().await;
            if let Some(registration) = registry.get_mut(&id) {
                registration.cron.stop(&self.inner.engine).await?;
            }
        }
        self.inner.replicator.update_triggered(id, 0, 0).await?;
        tracing::info!(job_id = id, "job suspended");
        Ok(())
    }

    /// Stop and unregister.
    pub async fn cancel_task(&self, id: u64) -> AppResult<()> {
        {
            let mut registry = self.inner.registry.lock().await;
            if let Some(mut registration) = registry.remove(&id) {
                registration.cron.stop(&self.inner.engine).await?;
            }
        }
        match self.inner.replicator.update_triggered(id, 0, 0).await {
            Ok(_) | Err(AppError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        tracing::info!(job_id = id, "job cancelled");
        Ok(())
    }

    /// Run a job now, in the background.
    pub async fn launch_task(&self, id: u64) -> AppResult<()> {
        let job = self.store().get_job(id)?;
        let balancers = self
            .balancers(id)
            .await
            .ok_or_else(|| AppError::not_found("scheduler", "job_id", id))?;

        let ctx = ScheduleContext::new(job, ScheduleType::Manual);
        tracing::info!(job_id = id, "manual execute");
        ctx.detail("manual execute");
        let this = self.clone();
        tokio::spawn(async move { this.run(ctx, balancers).await });
        Ok(())
    }

    /// Next fire of a registered job, as unix seconds.
    pub async fn next_fire_time(&self, id: u64) -> Option<i64> {
        let registry = self.inner.registry.lock().await;
        let registration = registry.get(&id)?;
        Some(registration.cron.next_time(&self.inner.engine).await)
    }

    async fn balancers(&self, id: u64) -> Option<Arc<JobBalancers>> {
        self.inner
            .registry
            .lock()
            .await
            .get(&id)
            .map(|r| r.balancers.clone())
    }

    pub async fn shutdown(&self) {
        self.delete_schedulers().await;
        if let Err(e) = self.inner.engine.shutdown().await {
            tracing::warn!(error = %e, "cron engine shutdown failed");
        }
    }

    // --------------------------------------------------------------- fires

    fn fire_fn(&self, id: u64) -> FireFn {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let inner = inner.clone();
            Box::pin(async move {
                if let Some(inner) = inner.upgrade() {
                    Scheduler { inner }.fire(id).await;
                }
            })
        })
    }

    /// Timer tick for job `id`.
    pub async fn fire(&self, id: u64) {
        if !self.inner.role.is_standalone_or_leader() {
            return;
        }
        let job = match self.store().get_job(id) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = id, error = %e, "fire skipped, job not found");
                return;
            }
        };
        let (next_time, balancers) = {
            let registry = self.inner.registry.lock().await;
            let Some(registration) = registry.get(&id) else {
                tracing::error!(job_id = id, "fire skipped, job not registered");
                return;
            };
            (
                registration.cron.next_time(&self.inner.engine).await,
                registration.balancers.clone(),
            )
        };

        let start_time = now_secs();
        if let Err(e) = self
            .inner
            .replicator
            .update_triggered(id, start_time, next_time)
            .await
        {
            tracing::warn!(job_id = id, error = %e, "failed to record fire");
        }
        let ctx = ScheduleContext::starting_at(job, ScheduleType::Auto, start_time);
        self.run(ctx, balancers).await;

        self.scan_misfires();
    }

    /// Start a compensating run for every misfired job without one in flight.
    pub fn scan_misfires(&self) {
        if !self.inner.role.is_standalone_or_leader() {
            return;
        }
        let misfires = match self.store().select_misfires(now_secs()) {
            Ok(misfires) => misfires,
            Err(e) => {
                tracing::error!(error = %e, "misfire scan failed");
                return;
            }
        };
        if misfires.is_empty() {
            tracing::debug!("no misfired job");
            return;
        }
        tracing::info!(count = misfires.len(), "misfired jobs found");
        for triggered in misfires {
            if !self.inner.misfires.insert(triggered.id) {
                continue;
            }
            let this = self.clone();
            tokio::spawn(async move {
                this.handle_misfire(triggered).await;
                this.inner.misfires.remove(&triggered.id);
            });
        }
    }

    /// Fire once for the missed slot and move the cursor one step past it.
    async fn handle_misfire(&self, triggered: Triggered) {
        let id = triggered.id;
        let job = match self.store().get_job(id) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = id, error = %e, "compensation skipped, job not found");
                return;
            }
        };
        let Some(balancers) = self.balancers(id).await else {
            tracing::error!(job_id = id, "compensation skipped, job not registered");
            return;
        };

        let past = triggered.next_time;
        let start_time = now_secs();
        let next_time = past + job.time_step;
        if let Err(e) = self
            .inner
            .replicator
            .update_triggered(id, start_time, next_time)
            .await
        {
            tracing::warn!(job_id = id, error = %e, "failed to record compensation");
        }

        let ctx = ScheduleContext::starting_at(job, ScheduleType::Compensation, start_time);
        let missed = format_secs(past);
        tracing::info!(job_id = id, missed = %missed, "compensating fire");
        ctx.detail(format!("compensating fire at {}", missed));
        self.run(ctx, balancers).await;
    }

    async fn run(&self, ctx: ScheduleContext, balancers: Arc<JobBalancers>) {
        let outcome = self.inner.dispatcher.run(&ctx, &balancers).await;
        self.finish(ctx, outcome).await;
    }

    /// Trigger sub-jobs, alert on failure, and store the trace.
    async fn finish(&self, ctx: ScheduleContext, outcome: DispatchOutcome) {
        let job = &ctx.job;
        let succeeded = outcome.succeeded();
        let result = match &outcome {
            DispatchOutcome::Succeeded => RESULT_SUCCEEDED.to_string(),
            DispatchOutcome::Failed(reason) => reason.clone(),
        };

        if !job.sub_job_ids.is_empty() && job.sub_job_strategy.should_trigger(succeeded) {
            ctx.detail(format!(
                "start triggering sub jobs, count: {}",
                job.sub_job_ids.len()
            ));
            tokio::spawn(
                self.clone()
                    .launch_sub_jobs(job.name.clone(), job.sub_job_ids.clone()),
            );
        }

        if !succeeded && !job.alarm_email.is_empty() {
            self.inner.alerts.send(AlertMessage::new(
                job.alarm_email.clone(),
                format!("cronhive alert: job {} failed", job.name),
                format!(
                    "alert time: {}\nresult: {}\ndetail: {}",
                    format_secs(now_secs()),
                    result,
                    ctx.joined_details()
                ),
            ));
            ctx.detail("alert sent");
        }

        let id = self.inner.ids.next_id_or_fallback();
        let trace = Trace {
            id: id as i64,
            job_id: job.id as i64,
            job_name: job.name.clone(),
            schedule_type: ctx.schedule_type.code(),
            start_time: ctx.start_time,
            end_time: now_secs(),
            execute_status: if succeeded {
                EXECUTE_STATUS_SUCCEED
            } else {
                EXECUTE_STATUS_FAILED
            },
            execute_result: result,
            execute_detail: ctx.joined_details(),
        };
        tracing::info!(
            job_id = job.id,
            schedule_type = %ctx.schedule_type,
            succeeded,
            "job run finished"
        );
        if let Err(e) = self.inner.traces.insert(&trace).await {
            tracing::error!(job_id = job.id, trace_id = trace.id, error = %e, "failed to store trace");
        }
    }

    /// Fire each sub-job in turn. Missing jobs are skipped.
    fn launch_sub_jobs(self, parent: String, ids: Vec<u64>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            for id in ids {
                let job = match self.store().get_job(id) {
                    Ok(job) => job,
                    Err(e) => {
                        tracing::warn!(job_id = id, error = %e, "sub job skipped");
                        continue;
                    }
                };
                let Some(balancers) = self.balancers(id).await else {
                    tracing::warn!(job_id = id, "sub job skipped, not registered");
                    continue;
                };
                tracing::info!(job_id = id, parent = %parent, "triggering sub job");
                let ctx = ScheduleContext::new(job, ScheduleType::Depend);
                ctx.detail(format!("sub job triggered, parent job: {}", parent));
                self.run(ctx, balancers).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::{JobStatus, SubJobStrategy};
    use crate::testing::{FakeReply, SchedulerFixture, job};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_registry_follows_leadership() {
        let f = SchedulerFixture::standalone().await;
        f.store.cascade_insert_job(&job(1, "a:1")).unwrap();
        f.store.cascade_insert_job(&job(2, "a:1")).unwrap();
        let mut paused = job(3, "a:1");
        paused.status = JobStatus::Paused;
        f.store.cascade_insert_job(&paused).unwrap();

        assert_eq!(f.scheduler.init_schedulers().await.unwrap(), 2);
        assert_eq!(f.scheduler.registered_count().await, 3);
        assert!(f.scheduler.is_running(1).await);
        assert!(!f.scheduler.is_running(3).await);
        assert!(f.store.get_triggered(1).unwrap().next_time > now_secs());
        assert_eq!(f.store.get_triggered(3).unwrap().next_time, 0);

        // a second gain without a loss in between registers nothing new
        assert_eq!(f.scheduler.init_schedulers().await.unwrap(), 0);
        assert_eq!(f.scheduler.registered_count().await, 3);

        f.scheduler.delete_schedulers().await;
        assert_eq!(f.scheduler.registered_count().await, 0);
        for id in 1..=3 {
            assert!(!f.scheduler.is_running(id).await);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fire_records_cursor_and_trace() {
        let f = SchedulerFixture::standalone().await;
        f.store.cascade_insert_job(&job(1, "a:1")).unwrap();
        f.scheduler.add_scheduler(&job(1, "a:1")).await.unwrap();

        f.scheduler.fire(1).await;

        let triggered = f.store.get_triggered(1).unwrap();
        assert_eq!(triggered.times, 1);
        assert!(triggered.next_time > triggered.prev_time);
        let traces = f.history.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].schedule_type, ScheduleType::Auto.code());
        assert!(traces[0].succeeded());
        assert!(traces[0].execute_detail.contains("selected executor: a:1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_follower_never_fires() {
        let f = SchedulerFixture::cluster(crate::testing::RecordingConsensus::new()).await;
        f.store.cascade_insert_job(&job(1, "a:1")).unwrap();
        f.scheduler.add_scheduler(&job(1, "a:1")).await.unwrap();

        f.scheduler.fire(1).await;
        assert!(f.executor.calls().is_empty());
        assert_eq!(f.store.get_triggered(1).unwrap().times, 0);

        f.scheduler.role().set_leader(true);
        f.scheduler.fire(1).await;
        assert_eq!(f.executor.calls().len(), 1);
        assert!(f
            .proposed()
            .iter()
            .any(|c| matches!(c, crate::cluster::command::RaftCommand::SaveTriggered(t) if t.id == 1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_misfire_compensated_once() {
        let f = SchedulerFixture::standalone().await;
        let mut missed = job(1, "a:1");
        missed.misfire_threshold = 30;
        f.store.cascade_insert_job(&missed).unwrap();
        f.scheduler.add_scheduler(&missed).await.unwrap();

        let now = now_secs();
        f.store
            .save_triggered(&Triggered {
                id: 1,
                times: 4,
                prev_time: now - 70,
                next_time: now - 10,
            })
            .unwrap();

        f.scheduler.scan_misfires();
        f.scheduler.scan_misfires();
        let traces = f.wait_for_traces(1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(f.history.len(), 1);
        assert_eq!(f.executor.calls().len(), 1);
        assert_eq!(traces[0].schedule_type, ScheduleType::Compensation.code());
        assert!(traces[0].execute_detail.starts_with("compensating fire at "));

        let triggered = f.store.get_triggered(1).unwrap();
        assert_eq!(triggered.next_time, now - 10 + 60);
        assert_eq!(triggered.times, 5);
        assert!(f.store.select_misfires(now_secs()).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_alerts_and_records_reason() {
        let f = SchedulerFixture::standalone().await;
        let mut failing = job(1, "a:1");
        failing.alarm_email = "ops@example.com".to_string();
        f.store.cascade_insert_job(&failing).unwrap();
        f.scheduler.add_scheduler(&failing).await.unwrap();
        f.executor.reply("a:1", FakeReply::Status(500));

        f.scheduler.launch_task(1).await.unwrap();
        let traces = f.wait_for_traces(1).await;
        assert!(!traces[0].succeeded());
        assert_eq!(traces[0].execute_result, "execute failed");
        assert_eq!(traces[0].schedule_type, ScheduleType::Manual.code());
        assert!(traces[0].execute_detail.starts_with("manual execute<line>"));
        assert!(traces[0].execute_detail.ends_with("alert sent"));

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.alerts.delivered().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(f.alerts.delivered()[0].recipients, "ops@example.com");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sub_jobs_follow_strategy() {
        let f = SchedulerFixture::standalone().await;
        let mut parent = job(1, "a:1");
        parent.sub_job_strategy = SubJobStrategy::OnSuccess;
        parent.sub_job_ids = vec![2, 99];
        for j in [parent.clone(), job(2, "b:1")] {
            f.store.cascade_insert_job(&j).unwrap();
            f.scheduler.add_scheduler(&j).await.unwrap();
        }

        f.scheduler.launch_task(1).await.unwrap();
        let traces = f.wait_for_traces(2).await;
        let child = traces.iter().find(|t| t.job_id == 2).unwrap();
        assert_eq!(child.schedule_type, ScheduleType::Depend.code());
        assert!(child
            .execute_detail
            .starts_with("sub job triggered, parent job: job-1"));
        let parent_trace = traces.iter().find(|t| t.job_id == 1).unwrap();
        assert!(parent_trace
            .execute_detail
            .contains("start triggering sub jobs, count: 2"));

        // a failed parent does not trigger on-success children
        f.executor.reply("a:1", FakeReply::Error);
        f.scheduler.launch_task(1).await.unwrap();
        f.wait_for_traces(3).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.history.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_activated_job_fires_on_its_timer() {
        let f = SchedulerFixture::standalone().await;
        let mut every_second = job(1, "a:1");
        every_second.cron = "*/1 * * * * *".to_string();
        every_second.time_step = 1;
        f.store.cascade_insert_job(&every_second).unwrap();

        assert_eq!(f.scheduler.init_schedulers().await.unwrap(), 1);
        let traces = f.wait_for_traces(1).await;
        assert_eq!(traces[0].job_id, 1);
        assert_eq!(traces[0].schedule_type, ScheduleType::Auto.code());
        assert!(traces[0].succeeded());

        let triggered = f.store.get_triggered(1).unwrap();
        assert!(triggered.times >= 1);
        assert!(triggered.next_time > triggered.prev_time);
        assert!(triggered.next_time - triggered.prev_time <= 2);
        f.scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_weekday_cursor_matches_engine_tick() {
        let f = SchedulerFixture::standalone().await;
        let mut fridays = job(1, "a:1");
        fridays.cron = "0 0 9 * * 5".to_string();
        f.store.cascade_insert_job(&fridays).unwrap();

        f.scheduler.add_scheduler(&fridays).await.unwrap();
        let stopped_next = f.scheduler.next_fire_time(1).await.unwrap();
        f.scheduler.schedule_task(1).await.unwrap();

        let seeded = f.store.get_triggered(1).unwrap().next_time;
        assert_eq!(seeded, stopped_next);
        assert_eq!(f.scheduler.next_fire_time(1).await, Some(seeded));
        assert!(f.store.select_misfires(now_secs()).unwrap().is_empty());
        f.scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trace_stored_when_id_clock_out_of_range() {
        let f = SchedulerFixture::standalone_with_ids(IdGenerator::with_clock(4, || 1_000)).await;
        f.store.cascade_insert_job(&job(1, "a:1")).unwrap();
        f.scheduler.add_scheduler(&job(1, "a:1")).await.unwrap();

        f.scheduler.launch_task(1).await.unwrap();
        let traces = f.wait_for_traces(1).await;
        assert_eq!(traces[0].job_id, 1);
        assert_eq!(traces[0].id as u64 & 0xffff, 4);
        assert!(traces[0].succeeded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_suspend_and_cancel() {
        let f = SchedulerFixture::standalone().await;
        f.store.cascade_insert_job(&job(1, "a:1")).unwrap();
        f.scheduler.add_scheduler(&job(1, "a:1")).await.unwrap();
        f.scheduler.schedule_task(1).await.unwrap();
        assert!(f.scheduler.is_running(1).await);

        f.scheduler.suspend_task(1).await.unwrap();
        assert!(f.scheduler.is_registered(1).await);
        assert!(!f.scheduler.is_running(1).await);
        let triggered = f.store.get_triggered(1).unwrap();
        assert_eq!((triggered.prev_time, triggered.next_time), (0, 0));

        f.scheduler.cancel_task(1).await.unwrap();
        assert!(!f.scheduler.is_registered(1).await);
        assert!(matches!(
            f.scheduler.launch_task(1).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
