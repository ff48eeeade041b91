use reqwest::Client;
use std::time::Duration;

/// Client for model calls; these are slow, so the timeout is generous.
pub fn build_client() -> Client {
    let timeout = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(60);
    build_client_with_timeout(Duration::from_secs(timeout))
}

pub fn build_client_with_timeout(timeout: Duration) -> Client {
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(connect).min(timeout))
        .build()
        .unwrap_or_else(|_| Client::new())
}
