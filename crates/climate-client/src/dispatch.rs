//! Authenticated request dispatch with bounded retries
//!
//! Every API call goes through `RequestDispatcher::call`, which attaches the
//! bearer token and JSON `Accept`/`Content-Type` headers, then applies the
//! response policy as one bounded loop:
//!
//! - 401: invalidate the rejected token and retry once with a refreshed one
//! - 429: wait `Retry-After` (or exponential backoff) and retry, up to a budget
//! - 204 or an empty 2xx body: empty JSON object
//! - other >= 400: `Error::Api` with status and body
//! - transport failure: `Error::Connection`, never retried here

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::token_manager::TokenManager;

/// Retry budgets for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after a 429
    pub max_rate_limit_retries: u32,
    /// Backoff for attempt n is `base_backoff_ms * 2^n` without `Retry-After`
    pub base_backoff_ms: u64,
    /// Extra attempts after a 401
    pub max_auth_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            base_backoff_ms: 1000,
            max_auth_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Delay before rate-limit retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// How the dispatcher treats a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    NoContent,
    Unauthorized,
    RateLimited,
    Failed,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        204 => StatusClass::NoContent,
        401 => StatusClass::Unauthorized,
        429 => StatusClass::RateLimited,
        s if s >= 400 => StatusClass::Failed,
        _ => StatusClass::Success,
    }
}

/// `Retry-After` as integer seconds. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Sends authenticated JSON requests on behalf of every client operation.
///
/// Cheap to clone; clones share the HTTP connection pool and token manager.
#[derive(Clone)]
pub struct RequestDispatcher {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    policy: RetryPolicy,
}

impl RequestDispatcher {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        Self {
            http,
            tokens,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Issue one logical request, applying the retry policy.
    pub async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let mut auth_retries = 0u32;
        let mut rate_limit_retries = 0u32;

        loop {
            let token = self.tokens.ensure_valid_token().await?;

            let mut request = self
                .http
                .request(method.clone(), url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                metrics::counter!("climate_requests_total", "status" => "connection_error")
                    .increment(1);
                Error::Connection(format!("{method} {url}: {e}"))
            })?;

            let status = response.status().as_u16();
            metrics::counter!("climate_requests_total", "status" => status.to_string())
                .increment(1);

            match classify_status(status) {
                StatusClass::Success => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| Error::Connection(format!("reading {url}: {e}")))?;
                    if bytes.iter().all(u8::is_ascii_whitespace) {
                        return Ok(empty_object());
                    }
                    return Ok(serde_json::from_slice(&bytes)?);
                }
                StatusClass::NoContent => return Ok(empty_object()),
                StatusClass::Unauthorized if auth_retries < self.policy.max_auth_retries => {
                    auth_retries += 1;
                    metrics::counter!("climate_request_retries_total", "reason" => "unauthorized")
                        .increment(1);
                    debug!(%method, url, "got 401, refreshing token and retrying");
                    self.tokens.invalidate_token(&token).await;
                }
                StatusClass::Unauthorized => {
                    let body = response.text().await.unwrap_or_default();
                    warn!(%method, url, "request rejected after token refresh");
                    return Err(Error::Auth(format!(
                        "{method} {url} rejected with 401 after refresh: {body}"
                    )));
                }
                StatusClass::RateLimited
                    if rate_limit_retries < self.policy.max_rate_limit_retries =>
                {
                    let delay = retry_after(response.headers())
                        .unwrap_or_else(|| self.policy.backoff(rate_limit_retries));
                    rate_limit_retries += 1;
                    metrics::counter!("climate_request_retries_total", "reason" => "rate_limited")
                        .increment(1);
                    debug!(
                        %method,
                        url,
                        delay_ms = delay.as_millis() as u64,
                        attempt = rate_limit_retries,
                        max = self.policy.max_rate_limit_retries,
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                StatusClass::RateLimited | StatusClass::Failed => {
                    let body = response.text().await.unwrap_or_default();
                    warn!(%method, url, status, "API request failed");
                    return Err(Error::Api { status, body });
                }
            }
        }
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.call(Method::GET, url, None).await
    }

    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        self.call(Method::PUT, url, Some(body)).await
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        self.call(Method::POST, url, Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.call(Method::DELETE, url, None).await
    }

    /// GET and deserialize into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let value = self.get(url).await?;
        Ok(serde_json::from_value(value)?)
    }
}
