//! Execution history persistence.
//!
//! Traces go to one of several PostgreSQL datasources. [`TraceDataSource`]
//! is a single database; [`TraceStore`] is what the scheduler and the API
//! talk to, implemented by [`RedundantTraceStore`].

mod redundant;
mod trace_repo;

pub use redundant::{REPLAY_QUEUE_CAPACITY, RedundantTraceStore};
pub use trace_repo::PgTraceRepository;

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::models::{CleanScope, Trace, TraceStatistic};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceQuery {
    pub job_id: Option<i64>,
    pub execute_status: Option<i16>,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TracePage {
    pub items: Vec<Trace>,
    pub total: i64,
}

/// Reachability of one datasource; the url has its credentials masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DataSourceHealth {
    pub name: String,
    pub url: String,
    pub usable: bool,
}

/// One history database.
#[async_trait]
pub trait TraceDataSource: Send + Sync {
    fn name(&self) -> &str;

    fn masked_url(&self) -> &str;

    async fn insert(&self, trace: &Trace) -> AppResult<()>;

    async fn page(&self, query: &TraceQuery) -> AppResult<TracePage>;

    async fn get(&self, id: i64) -> AppResult<Option<Trace>>;

    /// Top 20 jobs by failure rate among traces started at or after `since`.
    async fn statistics(&self, since: i64) -> AppResult<Vec<TraceStatistic>>;

    async fn clean(&self, scope: CleanScope, now_secs: i64) -> AppResult<usize>;

    /// Latest trace start time, `None` for an empty table.
    async fn max_start_time(&self) -> AppResult<Option<i64>>;

    async fn ping(&self) -> AppResult<()>;
}

/// History as seen by the scheduler and the API.
#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn insert(&self, trace: &Trace) -> AppResult<()>;

    async fn page(&self, query: &TraceQuery) -> AppResult<TracePage>;

    async fn get(&self, id: i64) -> AppResult<Option<Trace>>;

    async fn statistics(&self, since: i64) -> AppResult<Vec<TraceStatistic>>;

    async fn clean(&self, scope: CleanScope, now_secs: i64) -> AppResult<usize>;

    async fn ping_all(&self) -> Vec<DataSourceHealth>;
}
