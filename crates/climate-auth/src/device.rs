//! OAuth2 device authorization grant (RFC 8628)
//!
//! `start` registers a device code with the first configured client that
//! accepts it, `poll_once` performs a single token-endpoint check, and
//! `wait` drives polling until success, a fatal error, the deadline or
//! cancellation. `spawn_wait` runs the same loop as an independent task
//! whose handle cancels polling when dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientIdentity, OAuthConfig, OAuthEndpoints};
use crate::constants::{DEFAULT_POLL_INTERVAL, DEVICE_GRANT_TYPE};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::token::{TokenErrorResponse, TokenResponse};

/// Lifecycle of a device authorization attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceAuthState {
    #[default]
    NotStarted,
    Pending,
    Completed,
    Failed,
    TimedOut,
}

/// A registered device code awaiting user approval.
///
/// `client_id` is the identity that accepted the registration; polling and
/// every later refresh of the resulting tokens must use it.
#[derive(Clone)]
pub struct DeviceAuthSession {
    pub device_code: String,
    pub user_code: String,
    /// Complete verification URL when the server provides one
    pub verification_uri: String,
    /// Grows by the slow_down increment each time the server asks
    pub poll_interval: Duration,
    pub client_id: String,
    pub state: DeviceAuthState,
}

impl std::fmt::Debug for DeviceAuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAuthSession")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("poll_interval", &self.poll_interval)
            .field("client_id", &self.client_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Result of one token-endpoint poll.
#[derive(Debug)]
pub enum DevicePoll {
    Pending,
    Authorized(Credentials),
}

#[derive(Debug, Deserialize)]
struct DeviceAuthorizeResponse {
    device_code: String,
    user_code: String,
    #[serde(default)]
    verification_uri: Option<String>,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

/// Device-code grant against the configured login host.
pub struct DeviceAuthFlow {
    http: reqwest::Client,
    endpoints: OAuthEndpoints,
    clients: Vec<ClientIdentity>,
    slow_down_increment: Duration,
}

impl DeviceAuthFlow {
    pub fn new(http: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            endpoints: config.endpoints(),
            clients: config.device_clients.clone(),
            slow_down_increment: Duration::from_secs(config.slow_down_increment_secs),
        }
    }

    /// Register a device code, trying each configured client in order.
    ///
    /// A client the server rejects is skipped; a transport failure aborts
    /// immediately since the next client would hit the same host.
    #[instrument(skip_all)]
    pub async fn start(&self) -> Result<DeviceAuthSession> {
        if self.clients.is_empty() {
            return Err(Error::Config("no device authorization clients configured".into()));
        }

        let url = self.endpoints.device_authorize_url();
        let mut rejections = Vec::with_capacity(self.clients.len());

        for identity in &self.clients {
            let response = self
                .http
                .post(&url)
                .form(&[
                    ("client_id", identity.client_id.as_str()),
                    ("scope", identity.scope.as_str()),
                ])
                .send()
                .await
                .map_err(|e| Error::Http(format!("device authorize request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                debug!(
                    client_id = %identity.client_id,
                    %status,
                    body = %body,
                    "device authorization rejected, trying next client"
                );
                rejections.push(format!("{}: {status}", identity.client_id));
                continue;
            }

            let parsed: DeviceAuthorizeResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(client_id = %identity.client_id, error = %e, "malformed device authorize response");
                    rejections.push(format!("{}: malformed response", identity.client_id));
                    continue;
                }
            };

            info!(client_id = %identity.client_id, "device authorization started");
            return Ok(DeviceAuthSession {
                device_code: parsed.device_code,
                user_code: parsed.user_code,
                verification_uri: parsed
                    .verification_uri_complete
                    .or(parsed.verification_uri)
                    .unwrap_or_default(),
                poll_interval: parsed
                    .interval
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
                client_id: identity.client_id.clone(),
                state: DeviceAuthState::Pending,
            });
        }

        Err(Error::DeviceAuthorization(format!(
            "rejected by all clients ({})",
            rejections.join(", ")
        )))
    }

    /// Check the token endpoint once.
    ///
    /// `authorization_pending` and `slow_down` are not errors; `slow_down`
    /// lengthens `session.poll_interval`. Any other error response marks
    /// the session failed.
    pub async fn poll_once(&self, session: &mut DeviceAuthSession) -> Result<DevicePoll> {
        let response = self
            .http
            .post(self.endpoints.token_url())
            .form(&[
                ("client_id", session.client_id.as_str()),
                ("device_code", session.device_code.as_str()),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("device token poll failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("device token poll body: {e}")))?;

        if status.is_success() {
            let credentials = serde_json::from_str::<TokenResponse>(&body)
                .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
                .and_then(|token| Credentials::from_grant(token, &session.client_id));
            return match credentials {
                Ok(credentials) => {
                    session.state = DeviceAuthState::Completed;
                    info!(client_id = %session.client_id, "device authorization completed");
                    Ok(DevicePoll::Authorized(credentials))
                }
                Err(e) => {
                    session.state = DeviceAuthState::Failed;
                    Err(e)
                }
            };
        }

        let error = TokenErrorResponse::parse(&body);
        match error.error.as_str() {
            "authorization_pending" => {
                debug!("device authorization pending");
                Ok(DevicePoll::Pending)
            }
            "slow_down" => {
                session.poll_interval += self.slow_down_increment;
                debug!(
                    poll_interval_secs = session.poll_interval.as_secs(),
                    "server asked to slow down"
                );
                Ok(DevicePoll::Pending)
            }
            other => {
                session.state = DeviceAuthState::Failed;
                let reason = error
                    .error_description
                    .unwrap_or_else(|| format!("{status} {other}"));
                warn!(%status, error = %other, "device authorization failed");
                Err(Error::DeviceAuthorization(reason))
            }
        }
    }

    /// Poll on the session's interval until authorized or `deadline`.
    ///
    /// Returns `DeviceAuthTimeout` when the deadline passes, `Cancelled` when
    /// `cancel` fires (the session stays `Pending`), and the poll error on any
    /// fatal response. Each poll request is itself bounded by the deadline.
    #[instrument(skip_all, fields(client_id = %session.client_id))]
    pub async fn wait(
        &self,
        session: &mut DeviceAuthSession,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Credentials> {
        let allowed = deadline.saturating_duration_since(Instant::now());

        loop {
            let timed_out = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep_until(deadline) => true,
                _ = sleep(session.poll_interval) => false,
            };
            if timed_out {
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                polled = timeout_at(deadline, self.poll_once(session)) => polled,
            };

            match polled {
                Ok(Ok(DevicePoll::Authorized(credentials))) => return Ok(credentials),
                Ok(Ok(DevicePoll::Pending)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => break,
            }
        }

        session.state = DeviceAuthState::TimedOut;
        info!(allowed_secs = allowed.as_secs(), "device authorization timed out");
        Err(Error::DeviceAuthTimeout(allowed))
    }

    /// Run `wait` as a spawned task.
    ///
    /// Dropping the returned handle cancels polling.
    pub fn spawn_wait(self: Arc<Self>, mut session: DeviceAuthSession, deadline: Instant) -> DeviceAuthHandle {
        let cancel = CancellationToken::new();
        let child = cancel.child_token();
        let join = tokio::spawn(async move {
            let result = self.wait(&mut session, deadline, &child).await;
            (session, result)
        });
        DeviceAuthHandle {
            cancel: cancel.clone(),
            guard: Some(cancel.drop_guard()),
            join,
        }
    }
}

/// Handle to a device authorization wait running in the background.
pub struct DeviceAuthHandle {
    cancel: CancellationToken,
    guard: Option<DropGuard>,
    join: JoinHandle<(DeviceAuthSession, Result<Credentials>)>,
}

impl DeviceAuthHandle {
    /// Stop polling; `outcome` then resolves to `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task and return its result with the final session.
    pub async fn outcome(mut self) -> (DeviceAuthSession, Result<Credentials>) {
        let joined = (&mut self.join).await;
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }
        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let session = DeviceAuthSession {
                    device_code: String::new(),
                    user_code: String::new(),
                    verification_uri: String::new(),
                    poll_interval: Duration::ZERO,
                    client_id: String::new(),
                    state: DeviceAuthState::Failed,
                };
                (
                    session,
                    Err(Error::DeviceAuthorization(format!("poll task failed: {e}"))),
                )
            }
        }
    }
}
