//! Cron evaluation and the timer engine.
//!
//! Expressions carry a seconds field (`sec min hour dom month dow [year]`).
//! Timers run on one shared `tokio-cron-scheduler` instance; each job holds a
//! [`JobCron`] that knows whether its timer is currently registered there.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use croner::Cron;
use croner::parser::{CronParser, Seconds};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::utils::time::now_secs;

/// Callback run on every timer tick.
pub type FireFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Parse with the dialect the timer engine uses: seconds required, an
/// optional year, and day-of-month AND day-of-week when both are set.
pub fn parse(expr: &str) -> AppResult<Cron> {
    CronParser::builder()
        .seconds(Seconds::Required)
        .dom_and_dow(true)
        .build()
        .parse(expr.trim())
        .map_err(|e| AppError::Validation {
            field: "cron".to_string(),
            reason: format!("invalid cron expression '{}': {}", expr, e),
        })
}

pub fn validate_cron(expr: &str) -> bool {
    parse(expr).is_ok()
}

/// Seconds between the next two fires.
pub fn time_step(expr: &str) -> AppResult<i64> {
    let schedule = parse(expr)?;
    let mut upcoming = schedule.iter_after(Utc::now());
    match (upcoming.next(), upcoming.next()) {
        (Some(first), Some(second)) => Ok(second.timestamp() - first.timestamp()),
        _ => Err(AppError::Validation {
            field: "cron".to_string(),
            reason: format!("cron expression '{}' never fires twice", expr),
        }),
    }
}

/// The next `count` fire times as unix seconds.
pub fn next_fire_times(expr: &str, count: usize) -> AppResult<Vec<i64>> {
    Ok(parse(expr)?
        .iter_after(Utc::now())
        .take(count)
        .map(|at| at.timestamp())
        .collect())
}

fn next_after(schedule: &Cron, secs: i64) -> i64 {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .and_then(|now| schedule.find_next_occurrence(&now, false).ok())
        .map(|at| at.timestamp())
        .unwrap_or(0)
}

fn engine_error(e: impl Into<anyhow::Error>) -> AppError {
    AppError::Internal { source: e.into() }
}

/// Shared timer engine.
#[derive(Clone)]
pub struct CronEngine {
    scheduler: Arc<Mutex<JobScheduler>>,
}

impl CronEngine {
    /// Create and start the engine.
    pub async fn new() -> AppResult<Self> {
        let scheduler = JobScheduler::new().await.map_err(engine_error)?;
        scheduler.start().await.map_err(engine_error)?;
        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
        })
    }

    pub async fn add(&self, expr: &str, fire: FireFn) -> AppResult<Uuid> {
        let job = Job::new_async(expr, move |_uuid, _lock| fire())
            .map_err(|e| AppError::Validation {
                field: "cron".to_string(),
                reason: format!("invalid cron expression '{}': {}", expr, e),
            })?;
        self.scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(engine_error)
    }

    pub async fn remove(&self, id: &Uuid) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .remove(id)
            .await
            .map_err(engine_error)
    }

    /// Next tick the engine has planned for `id`, as unix seconds.
    pub async fn next_tick(&self, id: Uuid) -> Option<i64> {
        match self.scheduler.lock().await.next_tick_for_job(id).await {
            Ok(tick) => tick.map(|at| at.timestamp()),
            Err(e) => {
                tracing::debug!(timer = %id, error = %e, "next tick unavailable");
                None
            }
        }
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(engine_error)
    }
}

/// Timer state of one job.
pub struct JobCron {
    expr: String,
    schedule: Cron,
    timer: Option<Uuid>,
}

impl JobCron {
    pub fn new(expr: &str) -> AppResult<Self> {
        Ok(Self {
            expr: expr.to_string(),
            schedule: parse(expr)?,
            timer: None,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Register the timer; a running timer is left as is.
    pub async fn start(&mut self, engine: &CronEngine, fire: FireFn) -> AppResult<()> {
        if self.timer.is_some() {
            return Ok(());
        }
        self.timer = Some(engine.add(&self.expr, fire).await?);
        Ok(())
    }

    pub async fn stop(&mut self, engine: &CronEngine) -> AppResult<()> {
        if let Some(id) = self.timer.take() {
            engine.remove(&id).await?;
        }
        Ok(())
    }

    /// The engine's planned tick while running, otherwise the next fire
    /// computed from the expression.
    pub async fn next_time(&self, engine: &CronEngine) -> i64 {
        let now = now_secs();
        if let Some(id) = self.timer
            && let Some(tick) = engine.next_tick(id).await
            && tick > now
        {
            return tick;
        }
        next_after(&self.schedule, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_step() {
        assert_eq!(time_step("*/5 * * * * *").unwrap(), 5);
        assert_eq!(time_step("0 0 * * * *").unwrap(), 3600);
        assert_eq!(time_step("0 */15 * * * *").unwrap(), 900);
    }

    #[test]
    fn test_invalid_expression() {
        assert!(!validate_cron("not a cron"));
        assert!(!validate_cron("61 * * * * *"));
        assert!(validate_cron("0 30 9 * * Mon-Fri"));
        assert!(matches!(
            time_step("* * *"),
            Err(AppError::Validation { ref field, .. }) if field == "cron"
        ));
    }

    #[test]
    fn test_next_fire_times_are_spaced() {
        let times = next_fire_times("*/10 * * * * *", 5).unwrap();
        assert_eq!(times.len(), 5);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], 10);
        }
        assert!(times[0] >= now_secs());
    }

    #[test]
    fn test_next_after_boundary() {
        let schedule = parse("0 0 * * * *").unwrap();
        // 2024-01-01T00:00:00Z is itself a fire; the next is an hour later
        assert_eq!(next_after(&schedule, 1_704_067_200), 1_704_070_800);
    }

    #[test]
    fn test_weekday_numbering() {
        // 2024-01-01T00:00:00Z is a Monday
        let monday = parse("0 0 9 * * 1").unwrap();
        assert_eq!(next_after(&monday, 1_704_067_200), 1_704_099_600);
        let friday = parse("0 0 9 * * 5").unwrap();
        assert_eq!(next_after(&friday, 1_704_067_200), 1_704_445_200);
        let named = parse("0 0 9 * * FRI").unwrap();
        assert_eq!(next_after(&named, 1_704_067_200), 1_704_445_200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expressions_accepted_by_engine() {
        let engine = CronEngine::new().await.unwrap();
        let fire: FireFn = Arc::new(|| Box::pin(async {}));
        for expr in ["0 0 9 * * 1", "0 30 9 * * Mon-Fri", "0 0 0 1 1 * 2099"] {
            assert!(validate_cron(expr), "{expr}");
            let id = engine.add(expr, fire.clone()).await.unwrap();
            engine.remove(&id).await.unwrap();
        }
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_weekday_next_time_survives_start() {
        let engine = CronEngine::new().await.unwrap();
        let mut cron = JobCron::new("0 0 9 * * 5").unwrap();
        let fire: FireFn = Arc::new(|| Box::pin(async {}));

        let idle_next = cron.next_time(&engine).await;
        cron.start(&engine, fire).await.unwrap();
        assert_eq!(cron.next_time(&engine).await, idle_next);
        assert_eq!(next_fire_times("0 0 9 * * 5", 1).unwrap(), vec![idle_next]);

        cron.stop(&engine).await.unwrap();
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_cron_start_stop() {
        let engine = CronEngine::new().await.unwrap();
        let mut cron = JobCron::new("0 0 0 1 1 *").unwrap();
        let fire: FireFn = Arc::new(|| Box::pin(async {}));

        assert!(!cron.is_running());
        let idle_next = cron.next_time(&engine).await;
        assert!(idle_next > now_secs());

        cron.start(&engine, fire.clone()).await.unwrap();
        cron.start(&engine, fire).await.unwrap();
        assert!(cron.is_running());
        assert_eq!(cron.next_time(&engine).await, idle_next);

        cron.stop(&engine).await.unwrap();
        cron.stop(&engine).await.unwrap();
        assert!(!cron.is_running());
        engine.shutdown().await.unwrap();
    }
}
