use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;

use crate::ingest::types::FetchError;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; ListingIngest/0.1; +https://github.com/listing-ingest)";

/// Bounded retry with exponential backoff and a per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Sleep after the `attempt`-th failure (1-based): base, 2*base, 4*base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Shared HTTP client: one connection pool, one User-Agent, one retry
/// policy, and a global ceiling on concurrent multi-URL requests.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl HttpClient {
    pub fn new(
        user_agent: &str,
        policy: RetryPolicy,
        max_concurrency: usize,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            policy: RetryPolicy {
                attempts: policy.attempts.max(1),
                ..policy
            },
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `url` and return the body of the first 200 response.
    ///
    /// Timeouts, transport errors and non-200 statuses are retried up to
    /// `policy.attempts` times; the last reason is reported in
    /// [`FetchError::Exhausted`].
    pub async fn get_text(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<String, FetchError> {
        let attempts = self.policy.attempts;
        let mut reason = String::new();

        for attempt in 1..=attempts {
            let res = self
                .client
                .get(url)
                .query(params)
                .timeout(self.policy.timeout)
                .send()
                .await;

            match res {
                Ok(resp) if resp.status() == StatusCode::OK => match resp.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => reason = format!("reading body: {e}"),
                },
                Ok(resp) => reason = format!("HTTP {}", resp.status()),
                Err(e) if e.is_timeout() => reason = "timed out".to_string(),
                Err(e) => reason = e.to_string(),
            }

            counter!("ingest_http_retries_total").increment(1);
            tracing::warn!(
                target: "ingest",
                %url,
                attempt,
                attempts,
                reason = %reason,
                "request failed"
            );

            if attempt < attempts {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            reason,
        })
    }

    /// Like [`HttpClient::get_text`], but waits for a slot under the global
    /// concurrency ceiling first.
    pub async fn get_text_bounded(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<String, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Config("request limiter closed".into()))?;
        self.get_text(url, params).await
    }
}
