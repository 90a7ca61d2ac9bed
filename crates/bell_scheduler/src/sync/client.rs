//! HTTP access to the schedule server.
//!
//! Both endpoints hang off a single base URL and are selected with a `path`
//! query parameter:
//! - `?path=v2/course` returns the full schedule snapshot
//! - `?path=keepalive` returns `{"status": "OK", "lastDataChange": ...}`

use super::cache::{RequestKey, ResponseCache};
use super::error::SyncError;
use super::{ProbeResponse, ScheduleSource};
use crate::schedule::RawScheduleDescription;
use futures::future::BoxFuture;
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const COURSE_PATH: &str = "v2/course";
const KEEPALIVE_PATH: &str = "keepalive";

/// Configuration for the schedule server client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deployment URL of the schedule server
    pub base_url: String,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Delay before the first retry (doubles each time)
    pub retry_base_delay: Duration,
    /// Upper bound on a single retry delay, before jitter
    pub retry_max_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(10_000),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("bell_scheduler/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`ScheduleSource`] backed by the schedule server, with a response cache
/// that is served only when the live request fails.
pub struct HttpScheduleSource {
    client: Client,
    config: ClientConfig,
    cache: Arc<ResponseCache>,
}

impl HttpScheduleSource {
    pub fn new(config: ClientConfig, cache: Arc<ResponseCache>) -> Result<Self, SyncError> {
        // Fail on a bad base URL now rather than on the first request
        Url::parse(&config.base_url)?;

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::NetworkUnavailable {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.query_pairs_mut().append_pair("path", path);
        Ok(url)
    }

    /// Fetches `path` and decodes the body.
    ///
    /// A successful response is written to the response cache. If every
    /// attempt fails, an unexpired cached body for the same request is
    /// decoded instead; with nothing cached, the live error is returned.
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        correlation_id: &str,
    ) -> Result<T, SyncError> {
        let url = self.endpoint(path)?;
        let key = RequestKey::from_request("GET", url.as_str());

        let live = match self.get_with_retry(&url, correlation_id).await {
            Ok(body) => decode_body::<T>(&body).map(|value| (value, body)),
            Err(e) => Err(e),
        };

        match live {
            Ok((value, body)) => {
                self.cache.insert(key, body);
                Ok(value)
            }
            Err(e) => match self.cache.get(&key) {
                Some(body) => {
                    warn!(
                        correlation_id = %correlation_id,
                        path = path,
                        error = %e,
                        "Live request failed, serving cached response"
                    );
                    decode_body(&body)
                }
                None => Err(e),
            },
        }
    }

    /// Issues a GET, retrying transient failures with exponential backoff.
    async fn get_with_retry(&self, url: &Url, correlation_id: &str) -> Result<String, SyncError> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            match self.get_once(url).await {
                Ok(body) => {
                    debug!(
                        correlation_id = %correlation_id,
                        attempt = attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        body_len = body.len(),
                        "Request succeeded"
                    );
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        correlation_id = %correlation_id,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &Url) -> Result<String, SyncError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                endpoint: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Delay before retry number `attempt + 1`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay.as_millis() as u64;
        // Exponential backoff: base * 2^min(attempt, 10)
        let exponential = base.saturating_mul(2u64.pow(attempt.min(10)));
        let capped = exponential.min(self.config.retry_max_delay.as_millis() as u64);
        // Add jitter: 0-20% of the delay
        let jitter = rand::thread_rng().gen_range(0..=(capped / 5));
        Duration::from_millis(capped + jitter)
    }

    async fn fetch_schedule_inner(&self) -> Result<RawScheduleDescription, SyncError> {
        let correlation_id = generate_correlation_id();
        let start = Instant::now();
        info!(correlation_id = %correlation_id, "Fetching course schedule");

        let raw: RawScheduleDescription = self.fetch_json(COURSE_PATH, &correlation_id).await?;

        info!(
            correlation_id = %correlation_id,
            periods = raw.course_schedule.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Course schedule fetched"
        );
        Ok(raw)
    }

    async fn probe_inner(&self) -> Result<ProbeResponse, SyncError> {
        let correlation_id = generate_correlation_id();
        let url = self.endpoint(KEEPALIVE_PATH)?;

        // A liveness probe answered from cache says nothing, so no fallback here
        let body = self.get_with_retry(&url, &correlation_id).await?;
        let probe: ProbeResponse = decode_body(&body)?;
        if !probe.is_ok() {
            return Err(SyncError::UnexpectedResponse {
                message: format!("Keep-alive returned status {:?}", probe.status),
            });
        }

        debug!(
            correlation_id = %correlation_id,
            last_data_change = ?probe.last_data_change,
            "Keep-alive succeeded"
        );
        Ok(probe)
    }
}

impl ScheduleSource for HttpScheduleSource {
    fn fetch_schedule(&self) -> BoxFuture<'_, Result<RawScheduleDescription, SyncError>> {
        Box::pin(self.fetch_schedule_inner())
    }

    fn probe(&self) -> BoxFuture<'_, Result<ProbeResponse, SyncError>> {
        Box::pin(self.probe_inner())
    }
}

/// Decodes a response body, treating `{"error": ..., "message": ...}` as a
/// failed request.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, SyncError> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| match error.as_str() {
                Some(s) => s.to_string(),
                None => error.to_string(),
            });
        return Err(SyncError::ServerError { message });
    }

    Ok(serde_json::from_value(value)?)
}

/// Generates a unique correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
