//! Job-related DTOs for API requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{
    Executor, Job, JobStatus, Protocol, SelectStrategy, SubJobStrategy, Triggered,
};
use crate::utils::time::format_secs;

// ============================================================================
// Request DTOs
// ============================================================================

/// Request body for creating or replacing a job.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[schema(example = json!({
    "name": "nightly-report",
    "cron": "0 0 2 * * *",
    "uri": "/tasks/report",
    "strategy": "round",
    "executors": [
        { "address": "10.0.0.21:9000", "weight": 1, "status": "online" },
        { "address": "10.0.0.22:9000", "weight": 2, "status": "online" }
    ]
}))]
pub struct JobRequest {
    #[validate(length(min = 1, max = 64, message = "Job name must be between 1 and 64 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 120, message = "Cron expression must not be empty"))]
    #[schema(example = "0 */5 * * * *")]
    pub cron: String,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default = "default_uri")]
    #[validate(length(min = 1, max = 255, message = "URI must be between 1 and 255 characters"))]
    pub uri: String,

    #[serde(default)]
    #[validate(length(max = 255))]
    pub remark: String,

    #[serde(default)]
    pub creator: String,

    #[serde(default = "default_timeout")]
    #[validate(range(min = 1, max = 86400, message = "Timeout must be between 1 and 86400 seconds"))]
    pub timeout_secs: u64,

    #[serde(default)]
    #[validate(range(max = 10, message = "At most 10 retries"))]
    pub retry_count: u32,

    #[serde(default)]
    #[validate(range(max = 3600))]
    pub retry_wait_secs: u64,

    #[serde(default)]
    pub fail_takeover: bool,

    /// Seconds a missed fire may be late and still be compensated; 0 disables
    #[serde(default)]
    #[validate(range(min = 0, message = "Misfire threshold must not be negative"))]
    pub misfire_threshold: i64,

    #[serde(default)]
    pub strategy: SelectStrategy,

    /// `k=v|k=v` query parameters
    #[serde(default)]
    pub http_param: String,

    /// `k=v|k=v` request headers
    #[serde(default)]
    pub header_param: String,

    #[serde(default)]
    pub http_sign: bool,

    #[serde(default)]
    #[validate(range(max = 1000))]
    pub sharding_count: u32,

    /// Comma separated shard tokens
    #[serde(default)]
    pub sharding_param: String,

    #[serde(default)]
    pub alarm_email: String,

    #[serde(default)]
    pub sub_job_strategy: SubJobStrategy,

    #[serde(default)]
    pub sub_job_ids: Vec<u64>,

    #[validate(length(min = 1, message = "At least one executor is required"))]
    pub executors: Vec<Executor>,
}

fn default_uri() -> String {
    "/".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl JobRequest {
    /// Builds the job model; id, status, creation time and step are filled
    /// in by the service.
    pub fn into_job(self, id: u64) -> Job {
        Job {
            id,
            name: self.name,
            cron: self.cron,
            protocol: self.protocol,
            uri: self.uri,
            remark: self.remark,
            creator: self.creator,
            timeout_secs: self.timeout_secs,
            retry_count: self.retry_count,
            retry_wait_secs: self.retry_wait_secs,
            fail_takeover: self.fail_takeover,
            misfire_threshold: self.misfire_threshold,
            strategy: self.strategy,
            http_param: self.http_param,
            header_param: self.header_param,
            http_sign: self.http_sign,
            sharding_count: self.sharding_count,
            sharding_param: self.sharding_param,
            alarm_email: self.alarm_email,
            sub_job_strategy: self.sub_job_strategy,
            sub_job_ids: self.sub_job_ids,
            executors: self.executors,
            ..Default::default()
        }
    }
}

/// Request body for pausing or resuming a job.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JobStatusRequest {
    pub status: JobStatus,
}

/// Query for `/api/cron/validate`.
#[derive(Debug, Deserialize, IntoParams, Validate)]
pub struct CronQuery {
    #[validate(length(min = 1, max = 120, message = "Cron expression must not be empty"))]
    #[param(example = "0 */5 * * * *")]
    pub cron: String,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// A job with its schedule cursor.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub triggered: Option<Triggered>,
    /// Unix seconds of the next timer fire on this node, when registered
    pub next_fire_time: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CronValidation {
    pub valid: bool,
    /// Upcoming fire times, `YYYY-MM-DD HH:MM:SS` UTC
    pub next_fire_times: Vec<String>,
}

impl CronValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            next_fire_times: Vec::new(),
        }
    }

    pub fn from_secs(times: Vec<i64>) -> Self {
        Self {
            valid: true,
            next_fire_times: times.into_iter().map(format_secs).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn request(json: serde_json::Value) -> JobRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let req = request(serde_json::json!({
            "name": "report",
            "cron": "0 0 2 * * *",
            "executors": [{ "address": "10.0.0.21:9000", "weight": 1, "status": "online" }]
        }));
        assert!(req.validate().is_ok());
        let job = req.into_job(7);
        assert_eq!(job.id, 7);
        assert_eq!(job.uri, "/");
        assert_eq!(job.timeout_secs, 30);
        assert_eq!(job.strategy, SelectStrategy::Random);
        assert_eq!(job.status, JobStatus::Active);
    }

    #[test]
    fn test_requires_executor_and_name() {
        let req = request(serde_json::json!({
            "name": "",
            "cron": "0 0 2 * * *",
            "executors": []
        }));
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("executors"));
    }

    #[test]
    fn test_negative_misfire_threshold_rejected() {
        let req = request(serde_json::json!({
            "name": "report",
            "cron": "0 0 2 * * *",
            "misfire_threshold": -5,
            "executors": [{ "address": "10.0.0.21:9000", "weight": 1, "status": "online" }]
        }));
        assert!(req.validate().unwrap_err().field_errors().contains_key("misfire_threshold"));
    }

    #[test]
    fn test_cron_validation_formats_times() {
        let view = CronValidation::from_secs(vec![0, 60]);
        assert!(view.valid);
        assert_eq!(view.next_fire_times, vec!["1970-01-01 00:00:00", "1970-01-01 00:01:00"]);
        assert!(!CronValidation::invalid().valid);
    }
}
