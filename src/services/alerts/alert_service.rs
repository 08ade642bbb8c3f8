//! Queued, retried alert delivery.
//!
//! Callers enqueue and return immediately. One background task drains the
//! queue and tries each alert up to three times, one second apart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::provider::{AlertMessage, AlertProvider};
use super::webhook_provider::WebhookAlertProvider;
use crate::store::EntityStore;

pub const ALERT_QUEUE_CAPACITY: usize = 65535;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AlertService {
    queue: mpsc::Sender<AlertMessage>,
}

struct Delivery {
    fallback: Arc<dyn AlertProvider>,
    /// Read per alert: a webhook in the replicated alarm config wins over
    /// `fallback`
    store: Option<EntityStore>,
    timeout: Duration,
}

impl AlertService {
    pub fn start(
        fallback: Arc<dyn AlertProvider>,
        store: Option<EntityStore>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (queue, rx) = mpsc::channel(ALERT_QUEUE_CAPACITY);
        let delivery = Delivery {
            fallback,
            store,
            timeout,
        };
        tokio::spawn(drain(delivery, rx, cancel));
        Self { queue }
    }

    /// Enqueue without waiting; a full queue drops the alert.
    pub fn send(&self, message: AlertMessage) {
        if let Err(e) = self.queue.try_send(message) {
            tracing::error!(error = %e, "alert dropped");
        }
    }
}

impl Delivery {
    fn provider(&self) -> Arc<dyn AlertProvider> {
        let configured = self
            .store
            .as_ref()
            .and_then(|store| store.alarm_config().ok())
            .map(|config| config.webhook_url)
            .filter(|url| !url.is_empty());
        match configured {
            Some(url) => Arc::new(WebhookAlertProvider::new(url, self.timeout)),
            None => self.fallback.clone(),
        }
    }

    async fn deliver(&self, message: &AlertMessage) -> bool {
        let provider = self.provider();
        for attempt in 1..=MAX_ATTEMPTS {
            match provider.send(message).await {
                Ok(()) => {
                    tracing::info!(
                        provider = provider.name(),
                        subject = %message.subject,
                        attempt,
                        "alert delivered"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), attempt, error = %e, "alert delivery failed");
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }
        tracing::error!(provider = provider.name(), subject = %message.subject, "alert given up");
        false
    }
}

async fn drain(delivery: Delivery, mut rx: mpsc::Receiver<AlertMessage>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => {
                    delivery.deliver(&message).await;
                }
                None => break,
            },
        }
    }
}
