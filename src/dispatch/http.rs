//! Outbound executor calls.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::external::HTTP_CLIENT;

/// One GET against an executor.
pub struct ExecutorRequest {
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// Sends a single request; retries are the dispatcher's business. `Ok` holds
/// the response status, `Err` a transport failure.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn get(&self, request: &ExecutorRequest) -> Result<u16, String>;
}

/// [`HttpExecutor`] over the shared client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestExecutor;

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn get(&self, request: &ExecutorRequest) -> Result<u16, String> {
        let mut builder = HTTP_CLIENT.get(request.url.clone()).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}
