//! Periodic health checks that raise system alarms.
//!
//! Nothing is checked unless the alarm config names a system alarm address.
//! Each outage of a datasource or a cluster member is reported once and
//! forgotten when it recovers.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::RuntimeService;
use crate::services::alerts::{AlertMessage, AlertService};
use crate::utils::time::{format_secs, now_secs};

#[derive(Default)]
struct Outages {
    datasources: HashSet<String>,
    /// member name -> last time it answered, or when monitoring began
    last_seen: HashMap<String, i64>,
    members: HashSet<String>,
    cluster: bool,
}

pub struct Monitor {
    runtime: RuntimeService,
    alerts: AlertService,
    heartbeat_alarm_secs: i64,
    started_at: i64,
    outages: Mutex<Outages>,
}

impl Monitor {
    pub fn new(runtime: RuntimeService, alerts: AlertService, heartbeat_alarm_secs: u64) -> Self {
        Self {
            runtime,
            alerts,
            heartbeat_alarm_secs: heartbeat_alarm_secs as i64,
            started_at: now_secs(),
            outages: Mutex::new(Outages::default()),
        }
    }

    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.check(now_secs()).await,
                }
            }
            tracing::info!("monitor stopped");
        })
    }

    /// One round of checks as of `now` (unix seconds).
    pub async fn check(&self, now: i64) {
        let store = self.runtime.replicator().store();
        let recipients = match store.alarm_config() {
            Ok(config) if config.system_alarms_enabled() => config.sys_alarm_email,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read alarm config");
                return;
            }
        };
        let role = self.runtime.role();

        if role.is_standalone_or_leader() {
            self.check_datasources(&recipients, now).await;
        }
        if role.is_cluster() {
            if role.is_leader() {
                self.check_members(&recipients, now).await;
            }
            self.check_leader(&recipients, now);
        }
    }

    async fn check_datasources(&self, recipients: &str, now: i64) {
        let health = self.runtime.traces().ping_all().await;
        let mut raised = Vec::new();
        {
            let mut outages = self.outages();
            for source in health {
                if source.usable {
                    if outages.datasources.remove(&source.name) {
                        tracing::info!(datasource = %source.name, "datasource recovered");
                    }
                } else if outages.datasources.insert(source.name.clone()) {
                    raised.push(source);
                } else {
                    tracing::warn!(datasource = %source.name, "datasource still down, already alarmed");
                }
            }
        }
        for source in raised {
            tracing::warn!(datasource = %source.name, url = %source.url, "datasource unreachable");
            self.alerts.send(AlertMessage::new(
                recipients,
                "cronhive alert: datasource unavailable",
                format!(
                    "time: {}\ndatasource '{}' ({}) is unreachable",
                    format_secs(now),
                    source.name,
                    source.url
                ),
            ));
        }
    }

    async fn check_members(&self, recipients: &str, now: i64) {
        let health = match self.runtime.member_health().await {
            Ok(health) => health,
            Err(e) => {
                tracing::warn!(error = %e, "member health unavailable");
                return;
            }
        };

        let mut raised = Vec::new();
        {
            let mut outages = self.outages();
            for member in health {
                if member.reachable {
                    outages.last_seen.insert(member.name.clone(), now);
                    if outages.members.remove(&member.name) {
                        tracing::info!(node = %member.name, "cluster member recovered");
                    }
                    continue;
                }
                let last_seen = *outages
                    .last_seen
                    .entry(member.name.clone())
                    .or_insert(self.started_at);
                if now - last_seen < self.heartbeat_alarm_secs {
                    continue;
                }
                if outages.members.insert(member.name.clone()) {
                    raised.push((member.name, now - last_seen));
                } else {
                    tracing::warn!(node = %member.name, "cluster member still down, already alarmed");
                }
            }
        }
        for (name, silent_for) in raised {
            tracing::warn!(node = %name, silent_for, "cluster member lost");
            self.alerts.send(AlertMessage::new(
                recipients,
                "cronhive alert: cluster node failure",
                format!(
                    "time: {}\ncluster node '{}' has not answered for {} seconds",
                    format_secs(now),
                    name,
                    silent_for
                ),
            ));
        }
    }

    fn check_leader(&self, recipients: &str, now: i64) {
        let leader = self
            .runtime
            .replicator()
            .consensus()
            .and_then(|c| c.leader_id());
        let newly_lost = {
            let mut outages = self.outages();
            let was_lost = outages.cluster;
            outages.cluster = leader.is_none();
            leader.is_none() && !was_lost
        };
        if newly_lost {
            tracing::error!("no cluster leader");
            self.alerts.send(AlertMessage::new(
                recipients,
                "cronhive alert: cluster unavailable",
                format!(
                    "time: {}\nno leader can be found, check that every cluster node is running",
                    format_secs(now)
                ),
            ));
        }
    }

    fn outages(&self) -> std::sync::MutexGuard<'_, Outages> {
        self.outages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cluster::Consensus;
    use crate::models::{AlarmConfig, Node};
    use crate::services::runtime::tests::FakeProbe;
    use crate::testing::{RecordingConsensus, SchedulerFixture};

    const ADMIN: &str = "ops@example.com";

    fn monitor(f: &SchedulerFixture, probe: Arc<FakeProbe>) -> Monitor {
        let runtime = RuntimeService::new(
            f.scheduler.replicator().clone(),
            f.scheduler.role().clone(),
            Arc::new(f.traces.clone()),
            probe,
            "node-a",
        );
        Monitor::new(runtime, f.alert_service.clone(), 30)
    }

    fn enable_alarms(f: &SchedulerFixture) {
        f.store
            .save_alarm_config(&AlarmConfig {
                sys_alarm_email: ADMIN.to_string(),
                webhook_url: String::new(),
            })
            .unwrap();
    }

    async fn delivered(f: &SchedulerFixture, count: usize) -> Vec<AlertMessage> {
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.alerts.delivered().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // let a stray extra alert surface
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.alerts.delivered()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_silent_without_alarm_address() {
        let f = SchedulerFixture::standalone().await;
        f.history.set_down(true);
        monitor(&f, Arc::new(FakeProbe::default())).check(now_secs()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.alerts.delivered().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_datasource_alarm_once_per_outage() {
        let f = SchedulerFixture::standalone().await;
        enable_alarms(&f);
        let monitor = monitor(&f, Arc::new(FakeProbe::default()));

        f.history.set_down(true);
        monitor.check(now_secs()).await;
        monitor.check(now_secs()).await;
        let alerts = delivered(&f, 1).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].recipients, ADMIN);
        assert!(alerts[0].body.contains("primary"));

        f.history.set_down(false);
        monitor.check(now_secs()).await;
        f.history.set_down(true);
        monitor.check(now_secs()).await;
        assert_eq!(delivered(&f, 2).await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_member_alarm_after_heartbeat_window() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        enable_alarms(&f);
        let consensus = f.consensus.clone().unwrap();
        consensus.set_leader(Some("node-a"), true);
        f.scheduler.role().set_leader(true);
        for (name, http) in [("node-a", "10.0.0.1:8080"), ("node-b", "10.0.0.2:8080")] {
            f.store.insert_node(&Node::new(name, http, "")).unwrap();
            consensus.add_voter(name, "").await.unwrap();
        }
        let probe = Arc::new(FakeProbe::default());
        let monitor = monitor(&f, probe.clone());
        let t0 = now_secs();

        monitor.check(t0).await;
        probe.set_down("10.0.0.2:8080", true);
        monitor.check(t0 + 10).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.alerts.delivered().is_empty());

        monitor.check(t0 + 40).await;
        monitor.check(t0 + 80).await;
        let alerts = delivered(&f, 1).await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].subject.contains("cluster node failure"));
        assert!(alerts[0].body.contains("node-b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_leaderless_cluster_alarm() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        enable_alarms(&f);
        let monitor = monitor(&f, Arc::new(FakeProbe::default()));

        monitor.check(now_secs()).await;
        monitor.check(now_secs()).await;
        let alerts = delivered(&f, 1).await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].subject.contains("cluster unavailable"));
    }
}
