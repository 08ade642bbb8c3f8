//! Request signature verification.
//!
//! Callers send `X-Timestamp` (unix seconds, ten digits) and `X-Sign`, the
//! HMAC-SHA256 of the request path and query followed by the timestamp.
//! Requests older than [`MAX_SIGNATURE_AGE_SECS`] are refused.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::utils::sign::{SIGN_HEADER, TIMESTAMP_HEADER, verify};
use crate::utils::time::now_secs;

pub const MAX_SIGNATURE_AGE_SECS: i64 = 1800;

/// Shared secret handed to the middleware as its state.
#[derive(Clone)]
pub struct SignSecret(Arc<str>);

impl SignSecret {
    pub fn new(secret: impl AsRef<str>) -> Self {
        Self(Arc::from(secret.as_ref()))
    }
}

pub async fn signature_middleware(
    State(secret): State<SignSecret>,
    request: Request,
    next: Next,
) -> Response {
    // nested routers see a stripped path; the caller signed the full one
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| request.uri().clone());
    let base = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    match check(&secret, request.headers(), &base, now_secs()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(uri = %base, error = %e, "request signature rejected");
            e.into_response()
        }
    }
}

fn check(secret: &SignSecret, headers: &HeaderMap, uri: &str, now: i64) -> Result<(), AppError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };
    let (Some(timestamp), Some(signature)) = (header(TIMESTAMP_HEADER), header(SIGN_HEADER)) else {
        return Err(AppError::BadRequest {
            message: format!("missing {} or {} header", TIMESTAMP_HEADER, SIGN_HEADER),
        });
    };

    let seconds = match timestamp.parse::<i64>() {
        Ok(seconds) if timestamp.len() == 10 => seconds,
        _ => {
            return Err(AppError::BadRequest {
                message: format!("invalid {} header", TIMESTAMP_HEADER),
            });
        }
    };
    if seconds < now - MAX_SIGNATURE_AGE_SECS {
        return Err(AppError::BadRequest {
            message: "signature expired".to_string(),
        });
    }

    if !verify(&secret.0, &format!("{}{}", uri, timestamp), signature) {
        return Err(AppError::Unauthorized {
            message: "signature mismatch".to_string(),
        });
    }
    Ok(())
}
