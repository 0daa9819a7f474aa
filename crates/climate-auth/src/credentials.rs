//! In-memory credential holder
//!
//! Holds the single access/refresh token pair for a session. Nothing is
//! written to disk: the host persists the refresh token it receives from
//! rotations. Updates always replace the whole `Credentials` value so a
//! reader never observes a new access token paired with a stale refresh
//! token.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// OAuth credentials for one account.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed from `TokenResponse.expires_in` when the tokens are received.
/// `client_id` is the identity the tokens were issued to; refreshes must use
/// the same one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token for API calls, absent until the first refresh
    pub access_token: Option<String>,
    /// Rotatable: every successful exchange may replace it
    pub refresh_token: String,
    /// Access token expiry as unix timestamp in milliseconds
    pub expires_at: u64,
    pub client_id: String,
}

impl Credentials {
    /// Credentials restored by the host from a persisted refresh token.
    ///
    /// No access token is held, so the first use triggers a refresh.
    pub fn from_refresh_token(refresh_token: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            access_token: None,
            refresh_token: refresh_token.into(),
            expires_at: 0,
            client_id: client_id.into(),
        }
    }

    /// Credentials from an initial grant (device, password or code exchange).
    ///
    /// An initial grant without a refresh token cannot sustain a session.
    pub fn from_grant(token: TokenResponse, client_id: &str) -> Result<Self> {
        let refresh_token = token.refresh_token.ok_or(Error::NoRefreshToken)?;
        Ok(Self {
            access_token: Some(token.access_token),
            refresh_token,
            expires_at: expiry_after(token.expires_in),
            client_id: client_id.to_string(),
        })
    }

    /// The credentials that result from a refresh exchange.
    ///
    /// Keeps the current refresh token when the server did not rotate it.
    pub fn rotated(&self, token: TokenResponse) -> Self {
        Self {
            access_token: Some(token.access_token),
            refresh_token: token
                .refresh_token
                .unwrap_or_else(|| self.refresh_token.clone()),
            expires_at: expiry_after(token.expires_in),
            client_id: self.client_id.clone(),
        }
    }

    /// The access token if it is still usable `buffer` before expiry.
    pub fn usable_access_token(&self, now_millis: u64, buffer: Duration) -> Option<&str> {
        let buffer_millis = u64::try_from(buffer.as_millis()).unwrap_or(u64::MAX);
        match &self.access_token {
            Some(token) if now_millis.saturating_add(buffer_millis) < self.expires_at => Some(token),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token_set", &self.access_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Absolute expiry in unix milliseconds for a lifetime of `expires_in`
/// seconds, clamped at `u64::MAX`.
fn expiry_after(expires_in: u64) -> u64 {
    now_millis().saturating_add(expires_in.saturating_mul(1000))
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Holder of the session's current credentials.
///
/// Owned by exactly one token manager, which serializes writers. Every
/// mutation swaps or edits the value in one step.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: Option<Credentials>,
}

impl CredentialStore {
    /// Empty store: no session yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            current: Some(credentials),
        }
    }

    pub fn get(&self) -> Option<&Credentials> {
        self.current.as_ref()
    }

    /// Replace the credentials wholesale, returning the previous value.
    pub fn replace(&mut self, credentials: Credentials) -> Option<Credentials> {
        self.current.replace(credentials)
    }

    /// Drop the cached access token, keeping the refresh token.
    ///
    /// Returns whether an access token was cleared.
    pub fn clear_access_token(&mut self) -> bool {
        self.current
            .as_mut()
            .and_then(|c| c.access_token.take())
            .is_some()
    }

    /// Drop the access token only if it is still `rejected`.
    ///
    /// A token that was already replaced by a newer one is left alone.
    pub fn clear_access_token_if(&mut self, rejected: &str) -> bool {
        match self.current.as_mut() {
            Some(c) if c.access_token.as_deref() == Some(rejected) => {
                c.access_token = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials(suffix: &str, expires_at: u64) -> Credentials {
        Credentials {
            access_token: Some(format!("at_{suffix}")),
            refresh_token: format!("rt_{suffix}"),
            expires_at,
            client_id: "client".into(),
        }
    }

    fn token(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            expires_in: 600,
        }
    }

    #[test]
    fn usable_token_respects_buffer() {
        let now = 1_000_000;
        let creds = test_credentials("1", now + 20_000);
        // Expires in 20s, buffer is 30s: not usable
        assert!(
            creds
                .usable_access_token(now, Duration::from_secs(30))
                .is_none()
        );
        // With a 10s buffer it still is
        assert_eq!(
            creds.usable_access_token(now, Duration::from_secs(10)),
            Some("at_1")
        );
    }

    #[test]
    fn missing_access_token_is_not_usable() {
        let creds = Credentials::from_refresh_token("rt", "client");
        assert!(
            creds
                .usable_access_token(0, Duration::from_secs(0))
                .is_none()
        );
    }

    #[test]
    fn grant_without_refresh_token_is_rejected() {
        let result = Credentials::from_grant(token("at", None), "client");
        assert!(matches!(result, Err(Error::NoRefreshToken)));
    }

    #[test]
    fn grant_computes_absolute_expiry() {
        let before = now_millis();
        let creds = Credentials::from_grant(token("at", Some("rt")), "client").unwrap();
        assert!(creds.expires_at >= before + 600_000);
        assert_eq!(creds.client_id, "client");
    }

    #[test]
    fn huge_expires_in_saturates() {
        let mut grant = token("at", Some("rt"));
        grant.expires_in = u64::MAX;
        let creds = Credentials::from_grant(grant.clone(), "client").unwrap();
        assert_eq!(creds.expires_at, u64::MAX);
        assert_eq!(creds.rotated(grant).expires_at, u64::MAX);
        assert_eq!(
            creds.usable_access_token(now_millis(), Duration::MAX),
            None
        );
    }

    #[test]
    fn rotation_replaces_refresh_token() {
        let creds = test_credentials("old", 0);
        let rotated = creds.rotated(token("at_new", Some("rt_new")));
        assert_eq!(rotated.access_token.as_deref(), Some("at_new"));
        assert_eq!(rotated.refresh_token, "rt_new");
        assert_eq!(rotated.client_id, "client");
    }

    #[test]
    fn rotation_keeps_refresh_token_when_not_returned() {
        let creds = test_credentials("old", 0);
        let rotated = creds.rotated(token("at_new", None));
        assert_eq!(rotated.refresh_token, "rt_old");
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let debug = format!("{:?}", test_credentials("secret", 0));
        assert!(!debug.contains("at_secret"));
        assert!(!debug.contains("rt_secret"));
        assert!(debug.contains("access_token_set: true"));
    }

    #[test]
    fn replace_swaps_whole_value() {
        let mut store = CredentialStore::with_credentials(test_credentials("1", 0));
        let previous = store.replace(test_credentials("2", 5));
        assert_eq!(previous.unwrap().refresh_token, "rt_1");
        let current = store.get().unwrap();
        assert_eq!(current.refresh_token, "rt_2");
        assert_eq!(current.access_token.as_deref(), Some("at_2"));
    }

    #[test]
    fn clear_access_token_keeps_refresh_token() {
        let mut store = CredentialStore::with_credentials(test_credentials("1", 0));
        assert!(store.clear_access_token());
        assert!(!store.clear_access_token());
        let current = store.get().unwrap();
        assert!(current.access_token.is_none());
        assert_eq!(current.refresh_token, "rt_1");
    }

    #[test]
    fn conditional_clear_ignores_newer_token() {
        let mut store = CredentialStore::with_credentials(test_credentials("new", 0));
        assert!(!store.clear_access_token_if("at_old"));
        assert!(store.get().unwrap().access_token.is_some());
        assert!(store.clear_access_token_if("at_new"));
        assert!(store.get().unwrap().access_token.is_none());
    }

    #[test]
    fn empty_store() {
        let mut store = CredentialStore::new();
        assert!(store.is_empty());
        assert!(!store.clear_access_token());
        assert!(store.get().is_none());
    }
}
