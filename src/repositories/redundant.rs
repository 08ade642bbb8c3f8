//! Trace history spread over several datasources.
//!
//! Writes go to the current datasource. When it fails, the first other
//! datasource that answers a ping becomes current and the write is retried
//! there once. With more than one datasource every stored trace is queued and
//! copied to the others in the background; a datasource that fails is skipped
//! until a periodic ping finds it reachable again.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::models::{CleanScope, Trace, TraceStatistic};
use crate::repositories::{DataSourceHealth, TraceDataSource, TracePage, TraceQuery, TraceStore};

pub const REPLAY_QUEUE_CAPACITY: usize = 65535;
const RECHECK_INTERVAL: Duration = Duration::from_secs(60);

struct Replay {
    origin: usize,
    trace: Trace,
}

struct Inner {
    sources: Vec<Arc<dyn TraceDataSource>>,
    current: AtomicUsize,
    invalid: DashSet<usize>,
    replay: Option<mpsc::Sender<Replay>>,
}

#[derive(Clone)]
pub struct RedundantTraceStore {
    inner: Arc<Inner>,
}

impl RedundantTraceStore {
    /// The datasource holding the most recent trace becomes current; the
    /// first one wins a tie or when every table is empty.
    pub async fn open(
        sources: Vec<Arc<dyn TraceDataSource>>,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        if sources.is_empty() {
            return Err(AppError::Configuration {
                key: "datasources".to_string(),
                source: anyhow::anyhow!("no history datasource configured"),
            });
        }
        let current = pick_current(&sources).await;

        let (replay, queue) = if sources.len() > 1 {
            let (tx, rx) = mpsc::channel(REPLAY_QUEUE_CAPACITY);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let inner = Arc::new(Inner {
            sources,
            current: AtomicUsize::new(current),
            invalid: DashSet::new(),
            replay,
        });
        if let Some(queue) = queue {
            tokio::spawn(replay_loop(inner.clone(), queue, cancel));
        }

        let source = &inner.sources[current];
        tracing::info!(
            datasource = source.name(),
            url = source.masked_url(),
            "current history datasource"
        );
        Ok(Self { inner })
    }

    pub fn current_name(&self) -> &str {
        self.inner.current_source().name()
    }

    pub fn invalid_count(&self) -> usize {
        self.inner.invalid.len()
    }
}

async fn pick_current(sources: &[Arc<dyn TraceDataSource>]) -> usize {
    let mut best = 0;
    let mut best_time: Option<i64> = None;
    for (i, source) in sources.iter().enumerate() {
        match source.max_start_time().await {
            Ok(Some(time)) if best_time.is_none_or(|b| time > b) => {
                best = i;
                best_time = Some(time);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(
                datasource = source.name(),
                url = source.masked_url(),
                error = %e,
                "could not read latest trace time"
            ),
        }
    }
    best
}

impl Inner {
    fn current_source(&self) -> &Arc<dyn TraceDataSource> {
        &self.sources[self.current.load(Ordering::SeqCst)]
    }

    fn mark_invalid(&self, index: usize, error: &AppError) {
        let source = &self.sources[index];
        if self.invalid.insert(index) {
            tracing::error!(
                datasource = source.name(),
                url = source.masked_url(),
                error = %error,
                "history datasource marked invalid"
            );
        }
    }

    fn enqueue(&self, origin: usize, trace: &Trace) {
        let Some(replay) = &self.replay else {
            return;
        };
        match replay.try_send(Replay {
            origin,
            trace: trace.clone(),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(trace_id = trace.id, "replay queue full, trace not copied")
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(trace_id = trace.id, "replay queue closed")
            }
        }
    }

    async fn replay(&self, item: &Replay) {
        for (i, source) in self.sources.iter().enumerate() {
            if i == item.origin || self.invalid.contains(&i) {
                continue;
            }
            if let Err(e) = source.insert(&item.trace).await {
                self.mark_invalid(i, &e);
            }
        }
    }

    async fn recheck_invalid(&self) {
        let invalid: Vec<usize> = self.invalid.iter().map(|i| *i).collect();
        for i in invalid {
            let source = &self.sources[i];
            if source.ping().await.is_ok() {
                self.invalid.remove(&i);
                tracing::info!(
                    datasource = source.name(),
                    url = source.masked_url(),
                    "history datasource restored"
                );
            }
        }
    }
}

async fn replay_loop(inner: Arc<Inner>, mut queue: mpsc::Receiver<Replay>, cancel: CancellationToken) {
    let mut recheck = tokio::time::interval(RECHECK_INTERVAL);
    recheck.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = queue.recv() => match item {
                Some(item) => inner.replay(&item).await,
                None => break,
            },
            _ = recheck.tick() => inner.recheck_invalid().await,
        }
    }
    tracing::debug!("trace replay stopped");
}

#[async_trait]
impl TraceStore for RedundantTraceStore {
    async fn insert(&self, trace: &Trace) -> AppResult<()> {
        let inner = &self.inner;
        let current = inner.current.load(Ordering::SeqCst);
        let error = match inner.sources[current].insert(trace).await {
            Ok(()) => {
                inner.enqueue(current, trace);
                return Ok(());
            }
            Err(e) => e,
        };
        inner.mark_invalid(current, &error);

        for (i, source) in inner.sources.iter().enumerate() {
            if i == current || inner.invalid.contains(&i) {
                continue;
            }
            if let Err(e) = source.ping().await {
                inner.mark_invalid(i, &e);
                continue;
            }
            inner.current.store(i, Ordering::SeqCst);
            tracing::warn!(
                datasource = source.name(),
                url = source.masked_url(),
                "switched current history datasource"
            );
            source.insert(trace).await?;
            inner.enqueue(i, trace);
            return Ok(());
        }
        Err(error)
    }

    async fn page(&self, query: &TraceQuery) -> AppResult<TracePage> {
        self.inner.current_source().page(query).await
    }

    async fn get(&self, id: i64) -> AppResult<Option<Trace>> {
        self.inner.current_source().get(id).await
    }

    async fn statistics(&self, since: i64) -> AppResult<Vec<TraceStatistic>> {
        self.inner.current_source().statistics(since).await
    }

    /// Cleans every usable datasource; the count is the current one's.
    async fn clean(&self, scope: CleanScope, now_secs: i64) -> AppResult<usize> {
        let inner = &self.inner;
        let current = inner.current.load(Ordering::SeqCst);
        let removed = inner.sources[current].clean(scope, now_secs).await?;
        for (i, source) in inner.sources.iter().enumerate() {
            if i == current || inner.invalid.contains(&i) {
                continue;
            }
            if let Err(e) = source.clean(scope, now_secs).await {
                tracing::warn!(datasource = source.name(), error = %e, "clean failed on replica");
            }
        }
        Ok(removed)
    }

    async fn ping_all(&self) -> Vec<DataSourceHealth> {
        let mut health = Vec::with_capacity(self.inner.sources.len());
        for (i, source) in self.inner.sources.iter().enumerate() {
            let usable = match source.ping().await {
                Ok(()) => {
                    self.inner.invalid.remove(&i);
                    true
                }
                Err(e) => {
                    self.inner.mark_invalid(i, &e);
                    false
                }
            };
            health.push(DataSourceHealth {
                name: source.name().to_string(),
                url: source.masked_url().to_string(),
                usable,
            });
        }
        health
    }
}
