//! HTTP client for the Riigikogu open-data API.
//!
//! The upstream API throttles aggressively, so the request delay adapts:
//! every success shrinks it by 10% toward a 200 ms floor, every HTTP 429
//! doubles it up to a 10 s ceiling. Transient failures are retried with
//! exponential backoff; a 404 is a clean "not there", not an error.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{error, warn};

use rkradar_common::{Error, Result};

const MIN_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 10_000;
const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "rkradar/0.1 (vote prediction research)";

pub struct RiigikoguClient {
    http: reqwest::Client,
    base_url: String,
    delay_ms: Mutex<u64>,
}

impl RiigikoguClient {
    pub fn new(base_url: &str, rate_limit_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Upstream(format!("http client init: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            delay_ms: Mutex::new(rate_limit_ms.max(MIN_DELAY_MS)),
        })
    }

    async fn pace(&self) {
        let delay = *self.delay_ms.lock().await;
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    async fn on_success(&self) {
        let mut delay = self.delay_ms.lock().await;
        *delay = MIN_DELAY_MS.max((*delay as f64 * 0.9) as u64);
    }

    async fn on_rate_limit(&self) {
        let mut delay = self.delay_ms.lock().await;
        *delay = MAX_DELAY_MS.min(*delay * 2);
        warn!(delay_ms = *delay, "rate limited, backing off");
    }

    /// GET a JSON resource. `Ok(None)` means the resource does not exist;
    /// retried failures surface as [`Error::Upstream`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);

        let mut last_error = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            self.pace().await;

            let response = match self.http.get(&url).query(params).send().await {
                Ok(response) => response,
                Err(e) => {
                    error!(url, attempt, error = %e, "request failed");
                    last_error = e.to_string();
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.on_rate_limit().await;
                continue;
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                error!(url, attempt, %status, "upstream error status");
                last_error = format!("HTTP {status}");
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                }
                continue;
            }

            self.on_success().await;
            let body = response
                .json::<T>()
                .await
                .map_err(|e| Error::Upstream(format!("decode {url}: {e}")))?;
            return Ok(Some(body));
        }

        Err(Error::Upstream(format!(
            "{url} failed after {MAX_ATTEMPTS} attempts: {last_error}"
        )))
    }
}
