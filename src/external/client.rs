use std::sync::LazyLock;
use std::time::Duration;

/// Shared HTTP client for executor calls, cluster probes, consensus RPCs and
/// alert webhooks.
///
/// Built once on first use. Per-request timeouts are set by callers; the
/// client-wide timeout only caps requests that set none.
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        // Timeouts
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        // Connection pooling
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        // HTTP/2 settings
        .http2_adaptive_window(true)
        .http2_keep_alive_interval(Duration::from_secs(10))
        .http2_keep_alive_timeout(Duration::from_secs(20))
        .gzip(true)
        .user_agent(concat!("cronhive/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "falling back to a default HTTP client");
            reqwest::Client::new()
        })
});
