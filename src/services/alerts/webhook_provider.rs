//! Posts alerts as JSON to a webhook through the shared HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::provider::{AlertMessage, AlertProvider};
use crate::error::{AppError, AppResult};
use crate::external::HTTP_CLIENT;

pub struct WebhookAlertProvider {
    url: String,
    timeout: Duration,
}

impl WebhookAlertProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertProvider for WebhookAlertProvider {
    /// Any 2xx answer is a delivery.
    async fn send(&self, message: &AlertMessage) -> AppResult<()> {
        let response = HTTP_CLIENT
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({
                "recipients": message.recipients,
                "subject": message.subject,
                "body": message.body,
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e).context("alert webhook unreachable"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal {
                source: anyhow::anyhow!("alert webhook answered {}: {}", status, body),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
