//! Execution history DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::repositories::TraceQuery;

/// Filters and paging for `/api/traces`.
#[derive(Debug, Deserialize, IntoParams, Validate)]
pub struct TraceFilter {
    /// Only traces of this job
    pub job_id: Option<i64>,

    /// 1 = succeeded, 0 = failed
    #[validate(range(min = 0, max = 1, message = "Status must be 0 or 1"))]
    pub execute_status: Option<i16>,

    /// Page number (1-based)
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    #[param(minimum = 1, example = 1)]
    pub page: u32,

    /// Number of items per page (max 100)
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "Page size must be between 1 and 100"))]
    #[param(minimum = 1, maximum = 100, example = 20)]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

impl TraceFilter {
    pub fn to_query(&self) -> TraceQuery {
        TraceQuery {
            job_id: self.job_id,
            execute_status: self.execute_status,
            offset: i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size),
            limit: i64::from(self.page_size),
        }
    }
}

/// Number of rows removed by a clean.
#[derive(Debug, Serialize, ToSchema)]
pub struct CleanResponse {
    pub deleted: usize,
}
