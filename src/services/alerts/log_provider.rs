use async_trait::async_trait;

use super::provider::{AlertMessage, AlertProvider};
use crate::error::AppResult;

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertProvider;

#[async_trait]
impl AlertProvider for LogAlertProvider {
    async fn send(&self, message: &AlertMessage) -> AppResult<()> {
        tracing::warn!(
            recipients = %message.recipients,
            subject = %message.subject,
            body = %message.body,
            "alert"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
