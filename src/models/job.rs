use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How one executor is picked for a firing, or whether the firing is fanned
/// out across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectStrategy {
    #[default]
    Random,
    Round,
    WeightRandom,
    WeightRound,
    Sharding,
}

impl SelectStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectStrategy::Random => "random",
            SelectStrategy::Round => "round",
            SelectStrategy::WeightRandom => "weight_random",
            SelectStrategy::WeightRound => "weight_round",
            SelectStrategy::Sharding => "sharding",
        }
    }
}

impl std::fmt::Display for SelectStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition under which a job's sub-jobs are fired after it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubJobStrategy {
    #[default]
    OnCompletion,
    OnSuccess,
    OnFailure,
}

impl SubJobStrategy {
    pub fn should_trigger(&self, succeeded: bool) -> bool {
        match self {
            SubJobStrategy::OnCompletion => true,
            SubJobStrategy::OnSuccess => succeeded,
            SubJobStrategy::OnFailure => !succeeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Paused,
    #[default]
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorStatus {
    Offline,
    #[default]
    Online,
}

/// An HTTP endpoint that runs the job's work. Not necessarily a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Executor {
    /// `host:port`
    pub address: String,
    pub weight: u32,
    pub status: ExecutorStatus,
}

impl Executor {
    pub fn is_online(&self) -> bool {
        self.status == ExecutorStatus::Online
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub cron: String,
    pub protocol: Protocol,
    pub uri: String,
    pub remark: String,
    pub status: JobStatus,
    /// Unix milliseconds
    pub create_time: i64,
    pub creator: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_wait_secs: u64,
    pub fail_takeover: bool,
    /// Seconds a missed fire may be late and still be compensated; 0 disables
    pub misfire_threshold: i64,
    pub strategy: SelectStrategy,
    /// `k=v|k=v` query parameters
    pub http_param: String,
    /// `k=v|k=v` request headers
    pub header_param: String,
    pub http_sign: bool,
    pub sharding_count: u32,
    /// Comma separated shard tokens; empty means `0..sharding_count`
    pub sharding_param: String,
    pub alarm_email: String,
    pub sub_job_strategy: SubJobStrategy,
    pub sub_job_ids: Vec<u64>,
    /// Seconds between two consecutive cron fires
    pub time_step: i64,
    pub executors: Vec<Executor>,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }

    pub fn is_sharded(&self) -> bool {
        self.strategy == SelectStrategy::Sharding
    }

    pub fn online_executors(&self) -> Vec<&Executor> {
        self.executors.iter().filter(|e| e.is_online()).collect()
    }

    pub fn sharding_tokens(&self) -> Vec<String> {
        if self.sharding_param.is_empty() {
            (0..self.sharding_count).map(|i| i.to_string()).collect()
        } else {
            self.sharding_param.split(',').map(str::to_string).collect()
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            cron: String::new(),
            protocol: Protocol::Http,
            uri: "/".to_string(),
            remark: String::new(),
            status: JobStatus::Active,
            create_time: 0,
            creator: String::new(),
            timeout_secs: 30,
            retry_count: 0,
            retry_wait_secs: 0,
            fail_takeover: false,
            misfire_threshold: 0,
            strategy: SelectStrategy::Random,
            http_param: String::new(),
            header_param: String::new(),
            http_sign: false,
            sharding_count: 0,
            sharding_param: String::new(),
            alarm_email: String::new(),
            sub_job_strategy: SubJobStrategy::OnCompletion,
            sub_job_ids: Vec::new(),
            time_step: 0,
            executors: Vec::new(),
        }
    }
}
