//! Alert delivery channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// One alert. `recipients` is the comma separated address list taken from a
/// job's alarm email or the cluster alarm config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub recipients: String,
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn new(recipients: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipients: recipients.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// A channel alerts are delivered through. Implementations must be
/// `Send + Sync`; the alert service calls them from its own task.
#[async_trait]
pub trait AlertProvider: Send + Sync {
    /// Deliver `message`; an error makes the service retry.
    async fn send(&self, message: &AlertMessage) -> AppResult<()>;

    fn name(&self) -> &'static str;
}
