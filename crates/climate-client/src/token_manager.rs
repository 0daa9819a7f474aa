//! Access token lifecycle
//!
//! The token manager exclusively owns the session's `CredentialStore`.
//! Readers take the `RwLock` read side; every exchange runs under a separate
//! refresh guard so concurrent callers that find the token stale wait for
//! the in-flight exchange and reuse its result instead of starting another.
//! The outcome is shared whether the exchange succeeded or failed.
//!
//! Each successful rotation is published on a `watch` channel. The host
//! subscribes to persist the new refresh token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use climate_auth::{CredentialStore, Credentials, OAuthEndpoints, TOKEN_REFRESH_BUFFER, now_millis};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    buffer: Duration,
    store: RwLock<CredentialStore>,
    /// Holds the outcome of the most recent exchange
    refresh_guard: Mutex<Option<Result<String>>>,
    /// Bumped under `refresh_guard` after every exchange attempt and every
    /// `set_credentials`
    attempts: AtomicU64,
    rotated: watch::Sender<Option<Credentials>>,
}

impl TokenManager {
    /// Manager for an existing session.
    pub fn new(http: reqwest::Client, endpoints: &OAuthEndpoints, credentials: Credentials) -> Self {
        let manager = Self::unauthenticated(http, endpoints);
        manager.rotated.send_replace(Some(credentials.clone()));
        Self {
            store: RwLock::new(CredentialStore::with_credentials(credentials)),
            ..manager
        }
    }

    /// Manager with no credentials yet; install them with `set_credentials`.
    pub fn unauthenticated(http: reqwest::Client, endpoints: &OAuthEndpoints) -> Self {
        let (rotated, _) = watch::channel(None);
        Self {
            http,
            token_url: endpoints.token_url(),
            buffer: TOKEN_REFRESH_BUFFER,
            store: RwLock::new(CredentialStore::new()),
            refresh_guard: Mutex::new(None),
            attempts: AtomicU64::new(0),
            rotated,
        }
    }

    /// Override the safety margin subtracted from the token expiry.
    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// Install credentials from a completed login flow.
    pub async fn set_credentials(&self, credentials: Credentials) {
        let mut last = self.refresh_guard.lock().await;
        self.store.write().await.replace(credentials.clone());
        *last = None;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.rotated.send_replace(Some(credentials));
    }

    /// Snapshot of the current credentials.
    pub async fn credentials(&self) -> Option<Credentials> {
        self.store.read().await.get().cloned()
    }

    /// Receiver that observes every credential rotation.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credentials>> {
        self.rotated.subscribe()
    }

    /// Return a usable access token, refreshing first if it is missing or
    /// within the buffer of its expiry.
    ///
    /// Callers arriving while a refresh is in flight wait for it and get its
    /// outcome, the new token or the error.
    pub async fn ensure_valid_token(&self) -> Result<String> {
        let seen = self.attempts.load(Ordering::SeqCst);
        if let Some(token) = self.usable_token().await {
            return Ok(token);
        }

        let mut last = self.refresh_guard.lock().await;
        if self.attempts.load(Ordering::SeqCst) != seen
            && let Some(outcome) = last.as_ref()
        {
            debug!(ok = outcome.is_ok(), "reusing concurrent refresh outcome");
            return outcome.clone();
        }
        if let Some(token) = self.usable_token().await {
            return Ok(token);
        }
        self.attempt(&mut last).await
    }

    /// Exchange the refresh token for a new pair unconditionally.
    ///
    /// Calls that overlap an exchange already in flight share its result.
    /// On failure the previous credentials stay in place.
    pub async fn refresh(&self) -> Result<()> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut last = self.refresh_guard.lock().await;
        if self.attempts.load(Ordering::SeqCst) != seen
            && let Some(outcome) = last.as_ref()
        {
            debug!(ok = outcome.is_ok(), "refresh finished while waiting, sharing its outcome");
            return outcome.clone().map(|_| ());
        }
        self.attempt(&mut last).await.map(|_| ())
    }

    /// Drop the cached access token so the next use refreshes.
    pub async fn force_invalidate(&self) {
        if self.store.write().await.clear_access_token() {
            debug!("access token invalidated");
        }
    }

    /// Drop the access token only if it is still `rejected`.
    ///
    /// A 401 on a token another caller has already replaced is not a reason
    /// to discard the replacement.
    pub async fn invalidate_token(&self, rejected: &str) {
        if self.store.write().await.clear_access_token_if(rejected) {
            debug!("rejected access token invalidated");
        }
    }

    async fn usable_token(&self) -> Option<String> {
        let store = self.store.read().await;
        store
            .get()?
            .usable_access_token(now_millis(), self.buffer)
            .map(String::from)
    }

    /// Run one exchange and record its outcome for waiters.
    async fn attempt(&self, last: &mut Option<Result<String>>) -> Result<String> {
        let outcome = self.exchange().await;
        *last = Some(outcome.clone());
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Refresh exchange. Caller must hold `refresh_guard`.
    async fn exchange(&self) -> Result<String> {
        let current = self
            .store
            .read()
            .await
            .get()
            .cloned()
            .ok_or(climate_auth::Error::NoRefreshToken)?;

        let response = climate_auth::refresh_token(
            &self.http,
            &self.token_url,
            &current.client_id,
            &current.refresh_token,
        )
        .await;

        let token = match response {
            Ok(token) => token,
            Err(e) => {
                metrics::counter!("climate_token_refresh_total", "outcome" => "failure")
                    .increment(1);
                warn!(error = %e, client_id = %current.client_id, "token refresh failed");
                return Err(e.into());
            }
        };

        let rotated = current.rotated(token);
        let access_token = rotated
            .access_token
            .clone()
            .ok_or_else(|| Error::Auth("refresh returned no access token".into()))?;

        self.store.write().await.replace(rotated.clone());
        self.rotated.send_replace(Some(rotated));

        metrics::counter!("climate_token_refresh_total", "outcome" => "success").increment(1);
        info!(client_id = %current.client_id, "access token refreshed");
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(access: Option<&str>, expires_in_ms: u64) -> Credentials {
        Credentials {
            access_token: access.map(String::from),
            refresh_token: "rt_1".into(),
            expires_at: now_millis() + expires_in_ms,
            client_id: "client".into(),
        }
    }

    fn manager(server: &MockServer, creds: Credentials) -> TokenManager {
        TokenManager::new(
            reqwest::Client::new(),
            &OAuthEndpoints::new(&server.uri()),
            creds,
        )
    }

    fn token_body(access: &str, refresh: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 600
        })
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tokens = manager(&server, credentials(Some("at_1"), 3_600_000));
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_1");
    }

    #[tokio::test]
    async fn token_inside_buffer_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("refresh_token=rt_1"))
            .and(body_string_contains("client_id=client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_2", "rt_2")))
            .expect(1)
            .mount(&server)
            .await;

        // Expires in 10s, inside the 30s buffer
        let tokens = manager(&server, credentials(Some("at_1"), 10_000));
        let mut rotations = tokens.subscribe();

        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_2");
        let creds = tokens.credentials().await.unwrap();
        assert_eq!(creds.refresh_token, "rt_2");

        assert!(rotations.has_changed().unwrap());
        let published = rotations.borrow_and_update().clone().unwrap();
        assert_eq!(published.refresh_token, "rt_2");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("at_2", "rt_2"))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(manager(&server, credentials(None, 0)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let tokens = tokens.clone();
            handles.push(tokio::spawn(async move { tokens.ensure_valid_token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "at_2");
        }
    }

    #[tokio::test]
    async fn overlapping_refresh_calls_collapse() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("at_2", "rt_2"))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(manager(&server, credentials(Some("at_1"), 3_600_000)));
        let (a, b) = tokio::join!(tokens.refresh(), tokens.refresh());
        a.unwrap();
        b.unwrap();
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_2");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failed_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(manager(&server, credentials(None, 0)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let tokens = tokens.clone();
            handles.push(tokio::spawn(async move { tokens.ensure_valid_token().await }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(err.requires_reauth());
        }
    }

    #[tokio::test]
    async fn overlapping_failed_refresh_calls_collapse() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server, credentials(Some("at_1"), 3_600_000));
        let (a, b) = tokio::join!(tokens.refresh(), tokens.refresh());
        assert!(a.unwrap_err().requires_reauth());
        assert!(b.unwrap_err().requires_reauth());
    }

    #[tokio::test]
    async fn later_caller_retries_after_failed_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_2", "rt_2")))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server, credentials(None, 0));
        assert!(tokens.ensure_valid_token().await.is_err());
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_2");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let tokens = manager(&server, credentials(Some("at_1"), 3_600_000));
        let mut rotations = tokens.subscribe();
        rotations.borrow_and_update();

        let err = tokens.refresh().await.unwrap_err();
        assert!(err.requires_reauth());

        let creds = tokens.credentials().await.unwrap();
        assert_eq!(creds.access_token.as_deref(), Some("at_1"));
        assert_eq!(creds.refresh_token, "rt_1");
        assert!(!rotations.has_changed().unwrap());
    }

    #[tokio::test]
    async fn refresh_without_credentials_is_auth_error() {
        let server = MockServer::start().await;
        let tokens =
            TokenManager::unauthenticated(reqwest::Client::new(), &OAuthEndpoints::new(&server.uri()));
        let err = tokens.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn refresh_unreachable_is_connection_error() {
        let tokens = TokenManager::new(
            reqwest::Client::new(),
            &OAuthEndpoints::new("http://127.0.0.1:1"),
            credentials(None, 0),
        );
        let err = tokens.ensure_valid_token().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn force_invalidate_triggers_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_2", "rt_2")))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server, credentials(Some("at_1"), 3_600_000));
        tokens.force_invalidate().await;
        let creds = tokens.credentials().await.unwrap();
        assert!(creds.access_token.is_none());
        assert_eq!(creds.refresh_token, "rt_1");

        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_2");
    }

    #[tokio::test]
    async fn invalidate_ignores_replaced_token() {
        let server = MockServer::start().await;
        let tokens = manager(&server, credentials(Some("at_new"), 3_600_000));
        tokens.invalidate_token("at_old").await;
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_new");

        tokens.invalidate_token("at_new").await;
        assert!(tokens.credentials().await.unwrap().access_token.is_none());
    }

    #[tokio::test]
    async fn set_credentials_publishes() {
        let server = MockServer::start().await;
        let tokens =
            TokenManager::unauthenticated(reqwest::Client::new(), &OAuthEndpoints::new(&server.uri()));
        let mut rotations = tokens.subscribe();
        assert!(rotations.borrow().is_none());

        tokens
            .set_credentials(credentials(Some("at_1"), 3_600_000))
            .await;
        assert!(rotations.has_changed().unwrap());
        assert_eq!(
            rotations.borrow_and_update().as_ref().unwrap().refresh_token,
            "rt_1"
        );
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "at_1");
    }
}
