//! Signed HTTP calls between cluster members.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url};

use crate::error::{AppError, AppResult};
use crate::external::HTTP_CLIENT;
use crate::utils::params::request_uri;
use crate::utils::sign::{SIGN_HEADER, TIMESTAMP_HEADER, sign};
use crate::utils::time::now_secs;

/// Builds requests carrying `X-Timestamp` (unix seconds) and `X-Sign`.
#[derive(Debug, Clone)]
pub struct PeerClient {
    secret: String,
    timeout: Duration,
}

impl PeerClient {
    pub fn new(secret: impl Into<String>, timeout: Duration) -> Self {
        Self {
            secret: secret.into(),
            timeout,
        }
    }

    pub fn get(&self, url: &str) -> AppResult<RequestBuilder> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> AppResult<RequestBuilder> {
        self.request(Method::POST, url)
    }

    fn request(&self, method: Method, url: &str) -> AppResult<RequestBuilder> {
        let url = Url::parse(url).map_err(|e| AppError::BadRequest {
            message: format!("invalid peer url '{}': {}", url, e),
        })?;
        let timestamp = now_secs().to_string();
        let signature = sign(&self.secret, &format!("{}{}", request_uri(&url), timestamp));
        Ok(HTTP_CLIENT
            .request(method, url)
            .timeout(self.timeout)
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGN_HEADER, signature))
    }
}
