//! Execution traces in one PostgreSQL datasource.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;

use crate::config::DataSourceConfig;
use crate::db::{AsyncDbPool, connection, establish_async_connection_pool};
use crate::error::AppResult;
use crate::models::{CleanScope, Trace, TraceStatistic};
use crate::repositories::{TraceDataSource, TracePage, TraceQuery};
use crate::schema::t_trace;

const STATISTICS_SQL: &str = "\
SELECT job_id, \
       COUNT(*)::BIGINT AS total, \
       SUM(CASE WHEN execute_status = 1 THEN 1 ELSE 0 END)::BIGINT AS succeed, \
       SUM(CASE WHEN execute_status = 0 THEN 1 ELSE 0 END)::BIGINT AS failed, \
       (SUM(CASE WHEN execute_status = 0 THEN 1 ELSE 0 END) * 100 / COUNT(*))::BIGINT AS rate \
FROM t_trace \
WHERE start_time >= $1 \
GROUP BY job_id \
ORDER BY rate DESC \
LIMIT 20";

/// Trace repository for one named datasource. Cloning shares the pool.
#[derive(Clone)]
pub struct PgTraceRepository {
    name: String,
    masked_url: String,
    pool: AsyncDbPool,
}

impl PgTraceRepository {
    pub fn new(ds: &DataSourceConfig) -> Self {
        Self {
            name: ds.name.clone(),
            masked_url: ds.masked_url(),
            pool: establish_async_connection_pool(ds),
        }
    }
}

#[async_trait]
impl TraceDataSource for PgTraceRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn masked_url(&self) -> &str {
        &self.masked_url
    }

    async fn insert(&self, trace: &Trace) -> AppResult<()> {
        let mut conn = connection(&self.pool).await?;
        diesel::insert_into(t_trace::table)
            .values(trace)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn page(&self, query: &TraceQuery) -> AppResult<TracePage> {
        let mut conn = connection(&self.pool).await?;

        let mut items = t_trace::table.select(Trace::as_select()).into_boxed();
        let mut count = t_trace::table.count().into_boxed();
        if let Some(job_id) = query.job_id {
            items = items.filter(t_trace::job_id.eq(job_id));
            count = count.filter(t_trace::job_id.eq(job_id));
        }
        if let Some(status) = query.execute_status {
            items = items.filter(t_trace::execute_status.eq(status));
            count = count.filter(t_trace::execute_status.eq(status));
        }

        let total: i64 = count.get_result(&mut conn).await?;
        let items = items
            .order(t_trace::start_time.desc())
            .offset(query.offset)
            .limit(query.limit)
            .load(&mut conn)
            .await?;
        Ok(TracePage { items, total })
    }

    async fn get(&self, id: i64) -> AppResult<Option<Trace>> {
        let mut conn = connection(&self.pool).await?;
        Ok(t_trace::table
            .find(id)
            .select(Trace::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn statistics(&self, since: i64) -> AppResult<Vec<TraceStatistic>> {
        let mut conn = connection(&self.pool).await?;
        Ok(diesel::sql_query(STATISTICS_SQL)
            .bind::<BigInt, _>(since)
            .load(&mut conn)
            .await?)
    }

    async fn clean(&self, scope: CleanScope, now_secs: i64) -> AppResult<usize> {
        let mut conn = connection(&self.pool).await?;
        let removed = match scope.cutoff(now_secs) {
            Some(cutoff) => {
                diesel::delete(t_trace::table.filter(t_trace::start_time.lt(cutoff)))
                    .execute(&mut conn)
                    .await?
            }
            None => diesel::delete(t_trace::table).execute(&mut conn).await?,
        };
        Ok(removed)
    }

    async fn max_start_time(&self) -> AppResult<Option<i64>> {
        let mut conn = connection(&self.pool).await?;
        Ok(t_trace::table
            .select(diesel::dsl::max(t_trace::start_time))
            .first(&mut conn)
            .await?)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = connection(&self.pool).await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }
}
