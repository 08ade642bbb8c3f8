//! Server module for managing the node lifecycle
//!
//! Opens the local store and history datasources, joins or forms the
//! cluster, starts scheduling and serves the HTTP API until a shutdown
//! signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::api::routes::create_router;
use crate::cluster::bootstrap::bootstrap;
use crate::cluster::fsm::Fsm;
use crate::cluster::leadership::start_scheduling;
use crate::cluster::peer::PeerClient;
use crate::cluster::raft::RaftConsensus;
use crate::cluster::{Consensus, Leadership, Replicator, Role};
use crate::config::{Environment, RunMode, settings::Settings};
use crate::dispatch::{Dispatcher, ReqwestExecutor};
use crate::models::Node;
use crate::repositories::{PgTraceRepository, RedundantTraceStore, TraceDataSource};
use crate::scheduler::{CronEngine, Scheduler};
use crate::services::alerts::{AlertProvider, AlertService, LogAlertProvider, WebhookAlertProvider};
use crate::services::{Monitor, Services, default_admin};
use crate::state::AppState;
use crate::store::{EntityStore, FileKvStore};
use crate::utils::snowflake::IdGenerator;

/// Node process manager
pub struct Server {
    settings: Settings,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Start the node and run until shutdown signal
    ///
    /// # Errors
    /// - Local store or datasource initialization errors
    /// - Cluster bootstrap errors
    /// - Address binding errors
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = &self.settings;
        tracing::info!(
            app_name = %settings.application.name,
            app_version = %settings.application.version,
            environment = %Environment::from_env().as_str(),
            mode = %settings.node.mode,
            "Application starting"
        );
        tracing::info!(
            host = %settings.server.host,
            port = %settings.server.port,
            data_store_dir = %settings.node.data_store_dir,
            datasources = settings.datasources.len(),
            "Node configuration loaded"
        );

        let cancel = CancellationToken::new();

        let kv = FileKvStore::open(settings.node.data_store_path())?;
        tracing::info!(dir = %kv.dir().display(), "local store opened");
        let store = EntityStore::new(Arc::new(kv));
        let ids = Arc::new(IdGenerator::new(0));
        if store.is_first_start()? {
            if store.create_default_user_if_absent(&default_admin(&ids)?)? {
                tracing::info!("default console account created");
            }
            store.init_alarm_config()?;
        }

        let sources: Vec<Arc<dyn TraceDataSource>> = settings
            .datasources
            .iter()
            .map(|ds| Arc::new(PgTraceRepository::new(ds)) as Arc<dyn TraceDataSource>)
            .collect();
        let traces = RedundantTraceStore::open(sources, cancel.clone()).await?;

        let alert_timeout = Duration::from_secs(settings.alert.timeout_secs);
        let fallback: Arc<dyn AlertProvider> = match &settings.alert.webhook_url {
            Some(url) => Arc::new(WebhookAlertProvider::new(url, alert_timeout)),
            None => Arc::new(LogAlertProvider),
        };
        let alerts = AlertService::start(fallback, Some(store.clone()), alert_timeout, cancel.clone());

        let role = Arc::new(Role::new(settings.node.mode));
        let mut dispatcher = Dispatcher::new(
            Arc::new(ReqwestExecutor),
            settings.node.sign_secret_key.clone(),
            cancel.clone(),
        );

        let (consensus, identity, node_name) = match settings.node.mode {
            RunMode::Cluster => {
                let fsm = Fsm::new(store.clone(), role.clone());
                let cluster_node = bootstrap(settings, &store, fsm, role.clone()).await?;
                let name = settings.cluster.node_name.clone();
                dispatcher = dispatcher.with_scheduling_node(&name, &cluster_node.http_addr);
                let identity = Node::new(&name, &cluster_node.http_addr, &cluster_node.tcp_addr);
                (Some((cluster_node.consensus, cluster_node.leadership)), identity, name)
            }
            RunMode::Standalone => {
                let name = settings.server.port.to_string();
                let identity = Node::new(&name, settings.server.address(), "");
                (None, identity, name)
            }
        };

        let replicator = Replicator::new(
            store.clone(),
            consensus
                .as_ref()
                .map(|(raft, _)| raft.clone() as Arc<dyn Consensus>),
        );
        let scheduler = Scheduler::new(
            CronEngine::new().await?,
            replicator,
            dispatcher,
            role.clone(),
            ids,
            Arc::new(traces.clone()),
            alerts.clone(),
        );

        let raft: Option<Arc<RaftConsensus>> = match consensus {
            Some((raft, events)) => {
                Leadership::new(scheduler.clone(), identity).spawn(events, cancel.clone());
                Some(raft)
            }
            None => {
                start_scheduling(&scheduler, &identity).await?;
                None
            }
        };

        let peers = PeerClient::new(
            settings.node.sign_secret_key.clone(),
            settings.cluster.op_timeout(),
        );
        let services = Services::new(scheduler.clone(), Arc::new(traces), peers, node_name.clone());
        Monitor::new(
            services.runtime.clone(),
            alerts,
            settings.scheduler.heartbeat_alarm_secs,
        )
        .spawn(
            Duration::from_secs(settings.scheduler.monitor_interval_secs),
            cancel.clone(),
        );

        let state = AppState::new(services, role, node_name, settings.node.sign_secret_key.clone());
        let router = create_router(state);

        let address = settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;
        tracing::info!(address = %address, "Server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(cancel.clone()))
            .await?;

        scheduler.shutdown().await;
        if let Some(raft) = raft {
            raft.shutdown().await;
        }
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM and cancels every background task.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
    cancel.cancel();
}
