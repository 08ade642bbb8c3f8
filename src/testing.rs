//! In-process stand-ins for the network and database seams, shared by unit
//! tests across modules.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::cluster::command::RaftCommand;
use crate::cluster::consensus::{ClusterMember, Consensus};
use crate::cluster::{Replicator, Role};
use crate::config::RunMode;
use crate::dispatch::{Dispatcher, ExecutorRequest, HttpExecutor};
use crate::error::{AppError, AppResult};
use crate::models::{
    CleanScope, EXECUTE_STATUS_SUCCEED, Executor, ExecutorStatus, Job, Trace, TraceStatistic,
};
use crate::repositories::{RedundantTraceStore, TraceDataSource, TracePage, TraceQuery};
use crate::scheduler::{CronEngine, Scheduler};
use crate::services::alerts::{AlertMessage, AlertProvider, AlertService};
use crate::store::{EntityStore, MemoryKvStore};
use crate::utils::snowflake::IdGenerator;

// ------------------------------------------------------------- executors

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeReply {
    Status(u16),
    Error,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: Url,
    pub headers: BTreeMap<String, String>,
}

impl RecordedCall {
    pub fn address(&self) -> String {
        format!(
            "{}:{}",
            self.url.host_str().unwrap_or_default(),
            self.url.port_or_known_default().unwrap_or_default()
        )
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Answers 200 unless told otherwise per `host:port`. Queued replies are used
/// before the standing one.
#[derive(Default)]
pub struct FakeExecutor {
    standing: Mutex<HashMap<String, FakeReply>>,
    queued: Mutex<HashMap<String, VecDeque<FakeReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, address: &str, reply: FakeReply) {
        self.standing.lock().unwrap().insert(address.to_string(), reply);
    }

    pub fn reply_sequence(&self, address: &str, replies: Vec<FakeReply>) {
        self.queued
            .lock()
            .unwrap()
            .insert(address.to_string(), replies.into());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::address).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpExecutor for FakeExecutor {
    async fn get(&self, request: &ExecutorRequest) -> Result<u16, String> {
        let call = RecordedCall {
            url: request.url.clone(),
            headers: request.headers.clone(),
        };
        let address = call.address();
        self.calls.lock().unwrap().push(call);

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&address)
            .and_then(VecDeque::pop_front);
        let reply = queued
            .or_else(|| self.standing.lock().unwrap().get(&address).copied())
            .unwrap_or(FakeReply::Status(200));
        match reply {
            FakeReply::Status(status) => Ok(status),
            FakeReply::Error => Err(format!("connection refused: {}", address)),
        }
    }
}

// ------------------------------------------------------------- consensus

/// Records proposals; optionally refuses them.
#[derive(Default)]
pub struct RecordingConsensus {
    fail: bool,
    leader: Mutex<Option<String>>,
    is_leader: AtomicBool,
    proposed: Mutex<Vec<RaftCommand>>,
    voters: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn set_leader(&self, name: Option<&str>, this_node: bool) {
        *self.leader.lock().unwrap() = name.map(str::to_string);
        self.is_leader.store(this_node, Ordering::SeqCst);
    }

    pub fn proposed(&self) -> Vec<RaftCommand> {
        self.proposed.lock().unwrap().clone()
    }

    pub fn voters(&self) -> Vec<(String, String)> {
        self.voters.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Consensus for RecordingConsensus {
    async fn propose(&self, command: &RaftCommand) -> AppResult<()> {
        self.proposed.lock().unwrap().push(command.clone());
        if self.fail {
            return Err(AppError::consensus(
                "propose",
                anyhow::anyhow!("commit timed out"),
            ));
        }
        Ok(())
    }

    async fn add_voter(&self, name: &str, tcp_addr: &str) -> AppResult<()> {
        if self.fail {
            return Err(AppError::consensus("add voter", anyhow::anyhow!("not leader")));
        }
        self.voters
            .lock()
            .unwrap()
            .push((name.to_string(), tcp_addr.to_string()));
        Ok(())
    }

    async fn remove_peer(&self, name: &str) -> AppResult<()> {
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn leader_id(&self) -> Option<String> {
        self.leader.lock().unwrap().clone()
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    fn members(&self) -> Vec<ClusterMember> {
        let leader = self.leader_id();
        self.voters()
            .into_iter()
            .map(|(name, tcp_addr)| ClusterMember {
                leader: leader.as_deref() == Some(name.as_str()),
                name,
                tcp_addr,
                voter: true,
            })
            .collect()
    }
}

// --------------------------------------------------------------- history

pub fn trace(id: i64, start_time: i64) -> Trace {
    Trace {
        id,
        job_id: 1,
        job_name: "job-1".to_string(),
        schedule_type: 1,
        start_time,
        end_time: start_time + 1,
        execute_status: EXECUTE_STATUS_SUCCEED,
        execute_result: "succeeded".to_string(),
        execute_detail: String::new(),
    }
}

/// A history datasource in memory that can be switched off.
pub struct MemoryDataSource {
    name: String,
    masked_url: String,
    traces: Mutex<Vec<Trace>>,
    down: AtomicBool,
}

impl MemoryDataSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            masked_url: format!("***@{}:5432/history", name),
            traces: Mutex::new(Vec::new()),
            down: AtomicBool::new(false),
        }
    }

    pub fn seed(&self, trace: Trace) {
        self.traces.lock().unwrap().push(trace);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.traces.lock().unwrap().len()
    }

    pub fn traces(&self) -> Vec<Trace> {
        self.traces.lock().unwrap().clone()
    }

    fn check(&self) -> AppResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::ConnectionPool {
                source: anyhow::anyhow!("{} unreachable", self.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TraceDataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn masked_url(&self) -> &str {
        &self.masked_url
    }

    async fn insert(&self, trace: &Trace) -> AppResult<()> {
        self.check()?;
        self.seed(trace.clone());
        Ok(())
    }

    async fn page(&self, query: &TraceQuery) -> AppResult<TracePage> {
        self.check()?;
        let mut matching: Vec<Trace> = self
            .traces()
            .into_iter()
            .filter(|t| query.job_id.is_none_or(|id| t.job_id == id))
            .filter(|t| query.execute_status.is_none_or(|s| t.execute_status == s))
            .collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok(TracePage { items, total })
    }

    async fn get(&self, id: i64) -> AppResult<Option<Trace>> {
        self.check()?;
        Ok(self.traces().into_iter().find(|t| t.id == id))
    }

    async fn statistics(&self, since: i64) -> AppResult<Vec<TraceStatistic>> {
        self.check()?;
        let mut per_job: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
        for t in self.traces().iter().filter(|t| t.start_time >= since) {
            let entry = per_job.entry(t.job_id).or_default();
            entry.0 += 1;
            if t.succeeded() {
                entry.1 += 1;
            }
        }
        Ok(per_job
            .into_iter()
            .map(|(job_id, (total, succeed))| TraceStatistic {
                job_id,
                total,
                succeed,
                failed: total - succeed,
                rate: Some((total - succeed) * 100 / total),
            })
            .collect())
    }

    async fn clean(&self, scope: CleanScope, now_secs: i64) -> AppResult<usize> {
        self.check()?;
        let mut traces = self.traces.lock().unwrap();
        let before = traces.len();
        match scope.cutoff(now_secs) {
            Some(cutoff) => traces.retain(|t| t.start_time >= cutoff),
            None => traces.clear(),
        }
        Ok(before - traces.len())
    }

    async fn max_start_time(&self) -> AppResult<Option<i64>> {
        self.check()?;
        Ok(self.traces().iter().map(|t| t.start_time).max())
    }

    async fn ping(&self) -> AppResult<()> {
        self.check()
    }
}

// ---------------------------------------------------------------- alerts

/// Fails the first `failures` sends, then records deliveries.
pub struct RecordingAlertProvider {
    failures: usize,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<AlertMessage>>,
}

impl RecordingAlertProvider {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<AlertMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertProvider for RecordingAlertProvider {
    async fn send(&self, message: &AlertMessage) -> AppResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(AppError::Internal {
                source: anyhow::anyhow!("alert endpoint down"),
            });
        }
        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ------------------------------------------------------------- scheduler

/// A yearly cron so timers never fire during a test.
pub const QUIET_CRON: &str = "0 0 0 1 1 *";

pub fn job(id: u64, address: &str) -> Job {
    Job {
        id,
        name: format!("job-{}", id),
        cron: QUIET_CRON.to_string(),
        time_step: 60,
        executors: vec![Executor {
            address: address.to_string(),
            weight: 1,
            status: ExecutorStatus::Online,
        }],
        ..Default::default()
    }
}

/// A scheduler over in-memory state with every outbound seam recorded.
pub struct SchedulerFixture {
    pub scheduler: Scheduler,
    pub store: EntityStore,
    pub executor: Arc<FakeExecutor>,
    pub history: Arc<MemoryDataSource>,
    pub traces: RedundantTraceStore,
    pub alerts: Arc<RecordingAlertProvider>,
    pub alert_service: AlertService,
    pub consensus: Option<Arc<RecordingConsensus>>,
}

impl SchedulerFixture {
    pub async fn standalone() -> Self {
        Self::build(RunMode::Standalone, None, IdGenerator::new(1)).await
    }

    pub async fn standalone_with_ids(ids: IdGenerator) -> Self {
        Self::build(RunMode::Standalone, None, ids).await
    }

    pub async fn cluster(consensus: RecordingConsensus) -> Self {
        Self::build(RunMode::Cluster, Some(Arc::new(consensus)), IdGenerator::new(1)).await
    }

    async fn build(
        mode: RunMode,
        consensus: Option<Arc<RecordingConsensus>>,
        ids: IdGenerator,
    ) -> Self {
        let store = EntityStore::new(Arc::new(MemoryKvStore::new()));
        let executor = Arc::new(FakeExecutor::new());
        let history = Arc::new(MemoryDataSource::new("primary"));
        let alerts = Arc::new(RecordingAlertProvider::failing_first(0));
        let cancel = CancellationToken::new();

        let traces = RedundantTraceStore::open(
            vec![history.clone() as Arc<dyn TraceDataSource>],
            cancel.clone(),
        )
        .await
        .unwrap();
        let alert_service =
            AlertService::start(alerts.clone(), None, Duration::from_secs(1), cancel.clone());
        let replicator = Replicator::new(
            store.clone(),
            consensus.clone().map(|c| c as Arc<dyn Consensus>),
        );
        let scheduler = Scheduler::new(
            CronEngine::new().await.unwrap(),
            replicator,
            Dispatcher::new(executor.clone(), "secret", cancel),
            Arc::new(Role::new(mode)),
            Arc::new(ids),
            Arc::new(traces.clone()),
            alert_service.clone(),
        );
        Self {
            scheduler,
            store,
            executor,
            history,
            traces,
            alerts,
            alert_service,
            consensus,
        }
    }

    pub fn proposed(&self) -> Vec<RaftCommand> {
        self.consensus
            .as_ref()
            .map(|c| c.proposed())
            .unwrap_or_default()
    }

    /// Wait until the history holds at least `count` traces.
    pub async fn wait_for_traces(&self, count: usize) -> Vec<Trace> {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.history.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("traces not stored in time");
        self.history.traces()
    }
}
