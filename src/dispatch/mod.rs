//! Runs one firing of a job against its online executors.
//!
//! A non-sharded job calls a single executor picked by its strategy and, with
//! fail takeover, falls back to the remaining executors one at a time. A
//! sharded job splits its tokens across every online executor, calls them
//! concurrently and, with fail takeover, hands failed shards to executors
//! that succeeded.

pub mod balance;
pub mod context;
pub mod http;
pub mod sharding;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

pub use balance::{JobBalancers, random_excluding};
pub use context::{DETAIL_LINE_SEPARATOR, ScheduleContext};
pub use http::{ExecutorRequest, HttpExecutor, ReqwestExecutor};
pub use sharding::sharding;

use crate::models::Executor;
use crate::utils::params::{SHARDING_PARAM, build_url, kvs_to_map, request_uri};
use crate::utils::sign::{SIGN_HEADER, TIMESTAMP_HEADER, sign};
use crate::utils::time::now_millis;

pub const REASON_NO_EXECUTOR: &str = "no online executor";
pub const REASON_SHARDING: &str = "sharding error";
pub const REASON_EXECUTE_FAILED: &str = "execute failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    Failed(String),
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, DispatchOutcome::Succeeded)
    }

    fn from_success(succeeded: bool) -> Self {
        if succeeded {
            DispatchOutcome::Succeeded
        } else {
            DispatchOutcome::Failed(REASON_EXECUTE_FAILED.to_string())
        }
    }
}

/// An executor address plus the shard tokens it is asked to process.
#[derive(Debug, Clone)]
struct Assignment {
    address: String,
    tokens: Option<String>,
}

impl Assignment {
    fn single(executor: &Executor) -> Self {
        Self {
            address: executor.address.clone(),
            tokens: None,
        }
    }
}

pub struct Dispatcher {
    executor: Arc<dyn HttpExecutor>,
    sign_secret: String,
    /// `name - http_addr` of this node, recorded on every run in cluster mode
    scheduling_node: Option<String>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn HttpExecutor>, sign_secret: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            executor,
            sign_secret: sign_secret.into(),
            scheduling_node: None,
            cancel,
        }
    }

    pub fn with_scheduling_node(mut self, name: &str, http_addr: &str) -> Self {
        self.scheduling_node = Some(format!("{} - {}", name, http_addr));
        self
    }

    pub async fn run(&self, ctx: &ScheduleContext, balancers: &JobBalancers) -> DispatchOutcome {
        let job = &ctx.job;
        let candidates = job.online_executors();
        if candidates.is_empty() {
            tracing::error!(job_id = job.id, job = %job.name, "no online executor");
            return DispatchOutcome::Failed(REASON_NO_EXECUTOR.to_string());
        }
        if let Some(node) = &self.scheduling_node {
            ctx.detail(format!("scheduling node: {}", node));
        }
        ctx.detail(format!(
            "executor count: {}, select strategy: {}",
            candidates.len(),
            job.strategy
        ));

        if job.is_sharded() {
            self.run_sharded(ctx, &candidates).await
        } else {
            self.run_single(ctx, &candidates, balancers).await
        }
    }

    async fn run_single(
        &self,
        ctx: &ScheduleContext,
        candidates: &[&Executor],
        balancers: &JobBalancers,
    ) -> DispatchOutcome {
        let Some(index) = balancers.select(ctx.job.strategy, candidates) else {
            return DispatchOutcome::Failed(REASON_NO_EXECUTOR.to_string());
        };
        let selected = candidates[index];
        ctx.detail(format!("selected executor: {}", selected.address));

        let mut succeeded = self.execute(ctx, &Assignment::single(selected)).await;
        if !succeeded && ctx.job.fail_takeover && candidates.len() > 1 {
            succeeded = self.standalone_takeover(ctx, selected, candidates).await;
        }
        DispatchOutcome::from_success(succeeded)
    }

    /// Try the other executors in random order, each at most once.
    async fn standalone_takeover(
        &self,
        ctx: &ScheduleContext,
        failed: &Executor,
        candidates: &[&Executor],
    ) -> bool {
        let mut tried = vec![failed.address.clone()];
        for _ in 1..candidates.len() {
            let Some(index) = random_excluding(candidates, &tried) else {
                return false;
            };
            let target = candidates[index];
            tracing::info!(
                job_id = ctx.job.id,
                failed = %failed.address,
                executor = %target.address,
                "starting takeover"
            );
            ctx.detail(format!(
                "start takeover, failed node: {}, takeover node: {}",
                failed.address, target.address
            ));
            if self.execute(ctx, &Assignment::single(target)).await {
                ctx.detail("takeover succeeded");
                return true;
            }
            tried.push(target.address.clone());
            ctx.detail("takeover failed");
        }
        false
    }

    async fn run_sharded(&self, ctx: &ScheduleContext, candidates: &[&Executor]) -> DispatchOutcome {
        ctx.detail(format!("sharding count: {}", ctx.job.sharding_count));
        let tokens = ctx.job.sharding_tokens();
        let assignments: Vec<Assignment> = sharding(tokens.len(), candidates.len())
            .into_iter()
            .enumerate()
            .filter(|(_, indices)| !indices.is_empty())
            .map(|(i, indices)| Assignment {
                address: candidates[i].address.clone(),
                tokens: Some(
                    indices
                        .iter()
                        .map(|&t| tokens[t].as_str())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            })
            .collect();
        if assignments.is_empty() {
            return DispatchOutcome::Failed(REASON_SHARDING.to_string());
        }
        for assignment in &assignments {
            let shard = assignment.tokens.as_deref().unwrap_or_default();
            tracing::info!(job_id = ctx.job.id, executor = %assignment.address, shard, "shard assigned");
            ctx.detail(format!("sharding result: {} - {}", assignment.address, shard));
        }

        let results = join_all(assignments.iter().map(|a| self.execute(ctx, a))).await;
        let failed: Vec<&Assignment> = assignments
            .iter()
            .zip(results)
            .filter(|(_, ok)| !ok)
            .map(|(a, _)| a)
            .collect();

        let mut succeeded = failed.is_empty();
        if ctx.job.fail_takeover && !failed.is_empty() && candidates.len() > failed.len() {
            succeeded = self.sharding_takeover(ctx, candidates, &failed).await;
        }
        DispatchOutcome::from_success(succeeded)
    }

    /// Failed shard `i` goes to survivor `i % survivors`, then to every other
    /// survivor in order until one accepts it. Succeeds only when every
    /// failed shard was taken over.
    async fn sharding_takeover(
        &self,
        ctx: &ScheduleContext,
        candidates: &[&Executor],
        failed: &[&Assignment],
    ) -> bool {
        let survivors: Vec<&Executor> = candidates
            .iter()
            .copied()
            .filter(|c| failed.iter().all(|f| f.address != c.address))
            .collect();
        if survivors.is_empty() {
            return false;
        }

        let mut recovered = 0;
        for (i, shard) in failed.iter().enumerate() {
            let first = i % survivors.len();
            let order = std::iter::once(first).chain((0..survivors.len()).filter(|&j| j != first));
            for j in order {
                let target = Assignment {
                    address: survivors[j].address.clone(),
                    tokens: shard.tokens.clone(),
                };
                if self.execute(ctx, &target).await {
                    tracing::info!(
                        job_id = ctx.job.id,
                        failed = %shard.address,
                        executor = %target.address,
                        "shard taken over"
                    );
                    ctx.detail(format!(
                        "takeover, failed node: {}, takeover node: {}",
                        shard.address, target.address
                    ));
                    recovered += 1;
                    break;
                }
            }
        }
        recovered == failed.len()
    }

    /// GET with retries. Only a 200 counts as success.
    async fn execute(&self, ctx: &ScheduleContext, assignment: &Assignment) -> bool {
        let job = &ctx.job;
        let mut params = kvs_to_map(&job.http_param, "|");
        if let Some(tokens) = assignment.tokens.as_ref().filter(|t| !t.is_empty()) {
            params.insert(SHARDING_PARAM.to_string(), tokens.clone());
        }
        let url = match build_url(job.protocol.as_str(), &assignment.address, &job.uri, &params) {
            Ok(url) => url,
            Err(e) => {
                ctx.detail(e.to_string());
                return false;
            }
        };
        ctx.detail(format!("start HTTP request URL: {}", url));

        let mut headers = kvs_to_map(&job.header_param, "|");
        if job.http_sign {
            let timestamp = now_millis().to_string();
            let base = format!("{}{}", request_uri(&url), timestamp);
            ctx.detail(format!("signing string: {}", base));
            headers.insert(SIGN_HEADER.to_string(), sign(&self.sign_secret, &base));
            headers.insert(TIMESTAMP_HEADER.to_string(), timestamp);
        }
        let request = ExecutorRequest {
            url,
            headers,
            timeout: Duration::from_secs(job.timeout_secs.max(1)),
        };
        let wait = Duration::from_secs(job.retry_wait_secs);

        let mut last_error = String::new();
        for attempt in 0..=job.retry_count {
            if attempt > 0 {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        ctx.detail("HTTP request cancelled");
                        return false;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            match self.executor.get(&request).await {
                Ok(200) => {
                    ctx.detail("HTTP request succeeded");
                    return true;
                }
                Ok(status) => last_error = format!("HTTP request status: {}", status),
                Err(e) => last_error = format!("HTTP request error: {}", e),
            }
            tracing::warn!(
                job_id = job.id,
                executor = %assignment.address,
                attempt,
                error = %last_error,
                "executor call failed"
            );
        }
        tracing::error!(job_id = job.id, job = %job.name, executor = %assignment.address, error = %last_error, "executor call gave up");
        ctx.detail(last_error);
        false
    }
}
