//! Rate-limited, retrying page fetcher.
//!
//! One persistent [`reqwest::Client`] with shared headers is reused across
//! calls. A jittered politeness delay precedes every request, independent of
//! the exponential backoff applied between retry attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use schoolforge_shared::{FetchConfig, Result, SchoolForgeError};

/// User-Agent string for scrape requests. Sources block obvious bots, so a
/// realistic browser signature is used instead of the crate name.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Explicit retry policy value: attempt ceiling plus bounded exponential
/// backoff, with optional randomized jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Add up to +25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the (1-based) `failed_attempts`-th failure.
    /// Without jitter the sequence is strictly increasing until the cap.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(1 << exp);
        let capped = raw.min(self.max_delay);

        if self.jitter {
            let extra = {
                let mut rng = rand::thread_rng();
                rng.gen_range(0.0..0.25)
            };
            capped.mul_f64(1.0 + extra)
        } else {
            capped
        }
    }
}

/// Run `operation` under `policy`, sleeping the backoff delay between
/// attempts. The last error is returned once the attempt ceiling is hit.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut failed: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failed += 1;
                if failed >= policy.max_attempts.max(1) {
                    return Err(e);
                }
                let delay = policy.delay_for(failed);
                debug!(attempt = failed, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher owning the long-lived session and the concurrency permits.
///
/// Cloning via [`Arc`] inside is cheap; all clones share the same connection
/// pool and the same in-flight request cap.
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    politeness_min: Duration,
    politeness_max: Duration,
    permits: Arc<Semaphore>,
}

impl Fetcher {
    /// Build a fetcher from fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                SchoolForgeError::config(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            policy: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: Duration::from_millis(config.retry_base_ms),
                max_delay: Duration::from_millis(config.retry_max_ms),
                jitter: config.jitter,
            },
            politeness_min: Duration::from_millis(config.politeness_min_ms),
            politeness_max: Duration::from_millis(config.politeness_max_ms),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1) as usize)),
        })
    }

    /// Fetch `url`, returning the body and the resolved final URL after
    /// redirects. Timeouts and non-2xx statuses are retry-eligible; retry
    /// exhaustion surfaces as [`SchoolForgeError::Fetch`].
    pub async fn fetch(&self, url: &Url) -> Result<(String, Url)> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SchoolForgeError::Fetch {
                url: url.to_string(),
                cause: "fetcher shut down".into(),
            })?;

        with_retry(&self.policy, || self.request_once(url))
            .await
            .map_err(|cause| {
                warn!(%url, %cause, "fetch failed after retries");
                SchoolForgeError::Fetch {
                    url: url.to_string(),
                    cause,
                }
            })
    }

    /// One politeness-delayed request/response cycle.
    async fn request_once(&self, url: &Url) -> std::result::Result<(String, Url), String> {
        self.politeness_delay().await;

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| e.to_string())?;

        debug!(%url, final_url = %final_url, bytes = body.len(), "fetched");
        Ok((body, final_url))
    }

    /// Sleep a random duration within the configured politeness range.
    async fn politeness_delay(&self) {
        if self.politeness_max.is_zero() {
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.politeness_min..=self.politeness_max)
        };
        tokio::time::sleep(delay).await;
    }
}
