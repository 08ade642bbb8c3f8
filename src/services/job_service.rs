//! Job service: local write, timer bookkeeping, then proposal.

use crate::cluster::command::RaftCommand;
use crate::error::{AppError, AppResult};
use crate::models::{Job, JobStatus, Triggered};
use crate::scheduler::{self, Scheduler};
use crate::utils::time::now_millis;

/// Job service for handling job-related business logic.
#[derive(Clone)]
pub struct JobService {
    scheduler: Scheduler,
}

impl JobService {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn list_jobs(&self) -> AppResult<Vec<Job>> {
        self.scheduler.replicator().store().list_jobs()
    }

    pub fn get_job(&self, id: u64) -> AppResult<Job> {
        self.scheduler.replicator().store().get_job(id)
    }

    pub fn get_triggered(&self, id: u64) -> AppResult<Triggered> {
        self.scheduler.replicator().store().get_triggered(id)
    }

    /// Creates a job from `job`, ignoring any id, status, creation time and
    /// step it carries, and starts its timer.
    pub async fn insert_job(&self, mut job: Job) -> AppResult<Job> {
        job.time_step = scheduler::time_step(&job.cron)?;
        job.id = self.scheduler.ids().next_id()?;
        job.status = JobStatus::Active;
        job.create_time = now_millis();

        let replicator = self.scheduler.replicator();
        replicator.store().cascade_insert_job(&job)?;
        self.scheduler.add_scheduler(&job).await?;
        self.scheduler.schedule_task(job.id).await?;
        tracing::info!(job_id = job.id, job = %job.name, cron = %job.cron, "job created");

        replicator.submit(RaftCommand::InsertJob(job.clone())).await?;
        Ok(job)
    }

    /// Replaces the stored job. A changed cron re-registers the timer, which
    /// also resets the job's load-balancer counters.
    pub async fn update_job(&self, mut job: Job) -> AppResult<Job> {
        let replicator = self.scheduler.replicator();
        let existing = replicator.store().get_job(job.id)?;
        job.create_time = existing.create_time;
        job.status = existing.status;

        let cron_changed = existing.cron != job.cron;
        if cron_changed {
            job.time_step = scheduler::time_step(&job.cron)?;
        } else {
            job.time_step = existing.time_step;
        }
        replicator.store().update_job(&job)?;

        if cron_changed {
            self.scheduler.cancel_task(job.id).await?;
            self.scheduler.add_scheduler(&job).await?;
            if existing.is_active() {
                self.scheduler.schedule_task(job.id).await?;
            }
            tracing::info!(job_id = job.id, cron = %job.cron, "job rescheduled");
        }

        replicator.submit(RaftCommand::UpdateJob(job.clone())).await?;
        Ok(job)
    }

    /// Pause or resume.
    pub async fn update_job_status(&self, id: u64, status: JobStatus) -> AppResult<Job> {
        let replicator = self.scheduler.replicator();
        let mut job = replicator.store().get_job(id)?;
        job.status = status;
        replicator.store().update_job(&job)?;

        match status {
            JobStatus::Paused => self.scheduler.suspend_task(id).await?,
            JobStatus::Active => {
                if !self.scheduler.is_registered(id).await {
                    self.scheduler.add_scheduler(&job).await?;
                }
                self.scheduler.schedule_task(id).await?
            }
        }
        tracing::info!(job_id = id, ?status, "job status changed");

        replicator.submit(RaftCommand::UpdateJob(job.clone())).await?;
        Ok(job)
    }

    pub async fn delete_job(&self, id: u64) -> AppResult<()> {
        let replicator = self.scheduler.replicator();
        if replicator.store().find_job(id)?.is_none() {
            return Err(AppError::not_found("job", "id", id));
        }
        self.scheduler.cancel_task(id).await?;
        replicator.store().cascade_delete_job(id)?;
        tracing::info!(job_id = id, "job deleted");

        replicator.submit(RaftCommand::DeleteJob(id)).await
    }

    /// Run the job once now, outside its schedule.
    pub async fn launch_job(&self, id: u64) -> AppResult<()> {
        self.scheduler.launch_task(id).await
    }

    /// Move a job's schedule cursor and replicate it.
    pub async fn update_triggered(&self, id: u64, prev: i64, next: i64) -> AppResult<Triggered> {
        self.scheduler.replicator().update_triggered(id, prev, next).await
    }

    pub fn validate_cron(&self, expr: &str) -> bool {
        scheduler::validate_cron(expr)
    }

    pub fn next_fire_times(&self, expr: &str, count: usize) -> AppResult<Vec<i64>> {
        scheduler::next_fire_times(expr, count)
    }

    pub async fn next_fire_time(&self, id: u64) -> Option<i64> {
        self.scheduler.next_fire_time(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{QUIET_CRON, RecordingConsensus, SchedulerFixture, job};

    fn draft(name: &str) -> Job {
        Job {
            name: name.to_string(),
            ..job(0, "10.0.0.1:9000")
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_insert_assigns_identity_and_starts_timer() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        let service = JobService::new(f.scheduler.clone());

        let created = service
            .insert_job(Job {
                status: JobStatus::Paused,
                time_step: 1,
                ..draft("report")
            })
            .await
            .unwrap();

        assert_ne!(created.id, 0);
        assert_eq!(created.status, JobStatus::Active);
        assert!(created.create_time > 0);
        // yearly expression
        assert!(created.time_step >= 365 * 86_400);
        assert!(f.scheduler.is_running(created.id).await);
        assert!(f.store.get_triggered(created.id).unwrap().next_time > 0);
        assert_eq!(f.proposed(), vec![RaftCommand::InsertJob(created)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_insert_rejects_bad_cron() {
        let f = SchedulerFixture::standalone().await;
        let service = JobService::new(f.scheduler.clone());

        let result = service
            .insert_job(Job {
                cron: "every minute".to_string(),
                ..draft("broken")
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
        assert_eq!(f.store.job_count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_update_recomputes_step_only_on_cron_change() {
        let f = SchedulerFixture::standalone().await;
        let service = JobService::new(f.scheduler.clone());
        let created = service.insert_job(draft("sync")).await.unwrap();

        let renamed = service
            .update_job(Job {
                remark: "nightly".to_string(),
                time_step: 5,
                ..created.clone()
            })
            .await
            .unwrap();
        assert_eq!(renamed.time_step, created.time_step);
        assert_eq!(f.store.get_job(created.id).unwrap().remark, "nightly");

        let retimed = service
            .update_job(Job {
                cron: "*/10 * * * * *".to_string(),
                ..renamed
            })
            .await
            .unwrap();
        assert_eq!(retimed.time_step, 10);
        assert!(f.scheduler.is_running(created.id).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cron_change_keeps_paused_job_stopped() {
        let f = SchedulerFixture::standalone().await;
        let service = JobService::new(f.scheduler.clone());
        let created = service.insert_job(draft("sync")).await.unwrap();
        service
            .update_job_status(created.id, JobStatus::Paused)
            .await
            .unwrap();

        service
            .update_job(Job {
                cron: "*/30 * * * * *".to_string(),
                ..created.clone()
            })
            .await
            .unwrap();
        assert!(f.scheduler.is_registered(created.id).await);
        assert!(!f.scheduler.is_running(created.id).await);
        assert_eq!(f.store.get_job(created.id).unwrap().status, JobStatus::Paused);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_and_resume() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        let service = JobService::new(f.scheduler.clone());
        let created = service.insert_job(draft("sync")).await.unwrap();

        let paused = service
            .update_job_status(created.id, JobStatus::Paused)
            .await
            .unwrap();
        assert_eq!(paused.status, JobStatus::Paused);
        assert!(!f.scheduler.is_running(created.id).await);
        assert_eq!(f.store.get_triggered(created.id).unwrap().next_time, 0);

        service
            .update_job_status(created.id, JobStatus::Active)
            .await
            .unwrap();
        assert!(f.scheduler.is_running(created.id).await);
        assert!(f.store.get_triggered(created.id).unwrap().next_time > 0);
        assert!(matches!(
            f.proposed().last(),
            Some(RaftCommand::UpdateJob(j)) if j.status == JobStatus::Active
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delete_removes_job_and_cursor() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        let service = JobService::new(f.scheduler.clone());
        let created = service.insert_job(draft("sync")).await.unwrap();

        service.delete_job(created.id).await.unwrap();
        assert!(!f.scheduler.is_registered(created.id).await);
        assert!(f.store.find_job(created.id).unwrap().is_none());
        assert!(f.store.find_triggered(created.id).unwrap().is_none());
        assert_eq!(f.proposed().last(), Some(&RaftCommand::DeleteJob(created.id)));

        assert!(matches!(
            service.delete_job(created.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_proposal_keeps_local_write() {
        let f = SchedulerFixture::cluster(RecordingConsensus::failing()).await;
        let service = JobService::new(f.scheduler.clone());

        let result = service.insert_job(draft("sync")).await;
        assert!(matches!(result, Err(AppError::Consensus { .. })));
        assert_eq!(f.store.job_count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cron_helpers() {
        let f = SchedulerFixture::standalone().await;
        let service = JobService::new(f.scheduler.clone());
        assert!(service.validate_cron(QUIET_CRON));
        assert!(!service.validate_cron("* *"));

        let times = service.next_fire_times("*/5 * * * * *", 3).unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], 5);
    }
}
