//! HTTP fetching with exponential backoff retry logic.
//!
//! The harvest core only needs "give me the body of this URL or tell me why
//! not". That contract is the [`Fetcher`] trait:
//! - [`HttpFetcher`]: `reqwest` client carrying the configured default headers
//! - [`RetryFetch`]: decorator that adds bounded retries to any [`Fetcher`]
//!
//! Retrying is the collaborator's job. The pipeline itself never retries; a
//! failure that survives [`RetryFetch`] is recorded and the entry stays
//! pending for the next run.
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (transport errors, 429, 5xx)
//! - Exponential backoff from the configured base delay, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::config::CrawlConfig;
use crate::error::{ConfigError, FetchError};
use crate::models::Page;
use rand::{Rng, rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Anything that can turn a URL into a [`Page`].
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetcher`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: Fetcher,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    ///
    /// Saturates at `max_delay` however large `attempt` grows.
    fn backoff(&self, attempt: usize) -> Duration {
        u32::try_from(attempt.saturating_sub(1))
            .ok()
            .and_then(|exp| 2u32.checked_pow(exp))
            .map_or(self.max_delay, |factor| self.base_delay.saturating_mul(factor))
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetcher for RetryFetch<T>
where
    T: Fetcher,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() || attempt > self.max_retries {
                        if attempt > 1 {
                            error!(
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_dt.as_millis() as u64,
                                error = %e,
                                "fetch() exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// [`Fetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .default_headers(header_map(config)?)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .use_rustls_tls()
            .build()
            .map_err(|e| ConfigError::Header {
                name: "<client>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn header_map(config: &CrawlConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let invalid = |reason: String| ConfigError::Header {
            name: name.clone(),
            reason,
        };
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let val = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(key, val);
    }
    Ok(headers)
}

impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let t0 = Instant::now();
        let resp = self.client.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(transport)?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            %final_url,
            "Fetched"
        );
        Ok(Page { body, final_url })
    }
}
