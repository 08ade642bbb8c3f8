//! `k=v|k=v` parameter strings and executor URL assembly.

use std::collections::BTreeMap;

use reqwest::Url;

use crate::error::{AppError, AppResult};

/// Query parameter carrying the shard tokens assigned to one executor.
pub const SHARDING_PARAM: &str = "sharding";

/// Parse `k=v` pairs joined by `sep`. Pairs without `=` or with an empty key
/// are skipped; a later duplicate key wins.
pub fn kvs_to_map(base: &str, sep: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if base.is_empty() || sep.is_empty() {
        return map;
    }
    for kv in base.split(sep) {
        let Some((key, value)) = kv.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    map
}

/// `protocol://address` + uri (a leading `/` is added when missing) with
/// `params` appended to any query the uri already has.
pub fn build_url(
    protocol: &str,
    address: &str,
    uri: &str,
    params: &BTreeMap<String, String>,
) -> AppResult<Url> {
    let raw = if uri.starts_with('/') {
        format!("{}://{}{}", protocol, address, uri)
    } else {
        format!("{}://{}/{}", protocol, address, uri)
    };
    let mut url = Url::parse(&raw).map_err(|e| AppError::BadRequest {
        message: format!("invalid executor url '{}': {}", raw, e),
    })?;
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Path plus query, the part of a URL covered by a request signature.
pub fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
