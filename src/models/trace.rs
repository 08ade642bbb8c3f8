use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What caused a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Manual,
    Auto,
    Compensation,
    Depend,
}

impl ScheduleType {
    pub fn code(&self) -> i16 {
        match self {
            ScheduleType::Manual => 0,
            ScheduleType::Auto => 1,
            ScheduleType::Compensation => 2,
            ScheduleType::Depend => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(ScheduleType::Manual),
            1 => Some(ScheduleType::Auto),
            2 => Some(ScheduleType::Compensation),
            3 => Some(ScheduleType::Depend),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Manual => "manual",
            ScheduleType::Auto => "auto",
            ScheduleType::Compensation => "compensation",
            ScheduleType::Depend => "depend",
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const EXECUTE_STATUS_FAILED: i16 = 0;
pub const EXECUTE_STATUS_SUCCEED: i16 = 1;

/// Persisted outcome of one firing. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable, Insertable, ToSchema)]
#[diesel(table_name = crate::schema::t_trace)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Trace {
    pub id: i64,
    pub job_id: i64,
    pub job_name: String,
    pub schedule_type: i16,
    pub start_time: i64,
    pub end_time: i64,
    pub execute_status: i16,
    pub execute_result: String,
    pub execute_detail: String,
}

impl Trace {
    pub fn succeeded(&self) -> bool {
        self.execute_status == EXECUTE_STATUS_SUCCEED
    }
}

/// Per-job execution counts; `rate` is the failure percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName, ToSchema)]
pub struct TraceStatistic {
    #[diesel(sql_type = BigInt)]
    pub job_id: i64,
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub succeed: i64,
    #[diesel(sql_type = BigInt)]
    pub failed: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub rate: Option<i64>,
}

/// Age bound for deleting history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanScope {
    All,
    WeekAgo,
    MonthAgo,
    TwoMonthsAgo,
    ThreeMonthsAgo,
    SixMonthsAgo,
    YearAgo,
}

impl CleanScope {
    /// Records started before `now - days` are removed; `None` removes all.
    pub fn retention_days(&self) -> Option<i64> {
        match self {
            CleanScope::All => None,
            CleanScope::WeekAgo => Some(7),
            CleanScope::MonthAgo => Some(30),
            CleanScope::TwoMonthsAgo => Some(60),
            CleanScope::ThreeMonthsAgo => Some(90),
            CleanScope::SixMonthsAgo => Some(180),
            CleanScope::YearAgo => Some(365),
        }
    }

    pub fn cutoff(&self, now_secs: i64) -> Option<i64> {
        self.retention_days().map(|days| now_secs - days * 86_400)
    }
}
