//! OAuth endpoint and client identity configuration
//!
//! Every flow reads its endpoints from one base URL and its client identity
//! from this config, so hosts can point the library at a different login
//! host or reorder the device-authorization clients without code changes.

use common::Secret;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_OAUTH_BASE_URL, DEVICE_CLIENT_ID, DEVICE_SCOPE, SLOW_DOWN_INCREMENT, WEBAPP_CLIENT_ID,
    WEBAPP_SCOPE,
};

/// An OAuth client the flows can authenticate as.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    /// Space-separated scopes requested with this client
    #[serde(default)]
    pub scope: String,
    /// Only confidential clients have one; public clients leave it unset
    #[serde(default)]
    pub client_secret: Option<Secret<String>>,
}

impl ClientIdentity {
    /// Public client with no secret.
    pub fn public(client_id: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scope: scope.into(),
            client_secret: None,
        }
    }
}

/// Authorization-code (PKCE) client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PkceConfig {
    #[serde(flatten)]
    pub client: ClientIdentity,
    /// Must match a redirect URI registered for the client
    pub redirect_uri: String,
}

/// Root OAuth configuration shared by all three flows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub base_url: String,
    /// Device-authorization clients in the order they are tried
    pub device_clients: Vec<ClientIdentity>,
    /// Seconds added to the poll interval on each `slow_down`
    pub slow_down_increment_secs: u64,
    pub password_client: ClientIdentity,
    pub pkce: Option<PkceConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            device_clients: vec![
                ClientIdentity::public(WEBAPP_CLIENT_ID, WEBAPP_SCOPE),
                ClientIdentity::public(DEVICE_CLIENT_ID, DEVICE_SCOPE),
            ],
            slow_down_increment_secs: SLOW_DOWN_INCREMENT.as_secs(),
            password_client: ClientIdentity::public(WEBAPP_CLIENT_ID, WEBAPP_SCOPE),
            pkce: None,
        }
    }
}

impl OAuthConfig {
    pub fn endpoints(&self) -> OAuthEndpoints {
        OAuthEndpoints::new(&self.base_url)
    }
}

/// URLs of the OAuth2 endpoints under one login host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    base_url: String,
}

impl OAuthEndpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Device-code registration
    pub fn device_authorize_url(&self) -> String {
        format!("{}/oauth2/device_authorize", self.base_url)
    }

    /// Device poll, refresh, password grant and code exchange all POST here
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.base_url)
    }

    /// Browser-facing authorization endpoint for the PKCE flow
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth2/authorize", self.base_url)
    }
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_OAUTH_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_device_clients_prefer_webapp() {
        let config = OAuthConfig::default();
        let ids: Vec<&str> = config
            .device_clients
            .iter()
            .map(|c| c.client_id.as_str())
            .collect();
        assert_eq!(ids, vec![WEBAPP_CLIENT_ID, DEVICE_CLIENT_ID]);
    }

    #[test]
    fn endpoints_trim_trailing_slash() {
        let endpoints = OAuthEndpoints::new("https://login.example.com/");
        assert_eq!(
            endpoints.token_url(),
            "https://login.example.com/oauth2/token"
        );
        assert_eq!(
            endpoints.device_authorize_url(),
            "https://login.example.com/oauth2/device_authorize"
        );
        assert_eq!(
            endpoints.authorize_url(),
            "https://login.example.com/oauth2/authorize"
        );
    }

    #[test]
    fn fallback_order_is_configurable() {
        let json = serde_json::json!({
            "base_url": "https://login.example.com",
            "device_clients": [
                {"client_id": "secondary", "scope": "offline_access"},
                {"client_id": "primary"}
            ]
        });
        let config: OAuthConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.device_clients[0].client_id, "secondary");
        assert_eq!(config.device_clients[1].client_id, "primary");
        assert_eq!(config.device_clients[1].scope, "");
        // Unspecified fields keep their defaults
        assert_eq!(config.slow_down_increment_secs, 1);
        assert!(config.pkce.is_none());
    }

    #[test]
    fn pkce_client_flattens_identity() {
        let json = serde_json::json!({
            "pkce": {
                "client_id": "web",
                "scope": "home.user",
                "redirect_uri": "http://localhost:8765/callback"
            }
        });
        let config: OAuthConfig = serde_json::from_value(json).unwrap();
        let pkce = config.pkce.unwrap();
        assert_eq!(pkce.client.client_id, "web");
        assert_eq!(pkce.redirect_uri, "http://localhost:8765/callback");
    }
}
