//! One long-lived HTTP client per Index Source, built once at construction
//! and reused for every request (connection pool reuse instead of an
//! ad-hoc session per call).

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

/// Knobs that come from per-source configuration (`PROXPI_DISABLE_INDEX_SSL_VERIFICATION`,
/// connect/read timeouts) rather than from the crate itself.
pub struct ClientConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub danger_accept_invalid_certs: bool,
}

/// Builds the client used by an `IndexSource`: a bounded exponential-backoff
/// retry wraps transient failures (spec.md §4.1 calls for retrying "bounded,
/// short" without naming a count; 3 is chosen here, see DESIGN.md).
pub fn build_client(config: &ClientConfig) -> Result<ClientWithMiddleware, reqwest::Error> {
    let inner = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .build()?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    Ok(ClientBuilder::new(inner)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}
