//! Alert delivery for failed jobs and cluster health.

mod alert_service;
mod log_provider;
mod provider;
mod webhook_provider;

pub use alert_service::{ALERT_QUEUE_CAPACITY, AlertService};
pub use log_provider::LogAlertProvider;
pub use provider::{AlertMessage, AlertProvider};
pub use webhook_provider::WebhookAlertProvider;
