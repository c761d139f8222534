use reqwest::Client;
use std::time::Duration;

/// Client for long-running generation calls: bounded connect, unbounded body.
pub fn build_provider_client() -> Client {
    base_builder().build().unwrap_or_else(|_| Client::new())
}

pub fn build_provider_client_with_timeout(timeout_secs: u64) -> Client {
    base_builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn base_builder() -> reqwest::ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
}
