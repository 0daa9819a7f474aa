//! Resource owner password grant
//!
//! Kept for accounts and hosts that cannot run an interactive flow. The
//! vendor treats this grant as legacy and may stop accepting it.

use common::Secret;
use tracing::{info, instrument};

use crate::config::{ClientIdentity, OAuthConfig, OAuthEndpoints};
use crate::credentials::Credentials;
use crate::error::Result;
use crate::token;

pub struct PasswordFlow {
    http: reqwest::Client,
    endpoints: OAuthEndpoints,
    client: ClientIdentity,
}

impl PasswordFlow {
    pub fn new(http: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            endpoints: config.endpoints(),
            client: config.password_client.clone(),
        }
    }

    /// Exchange a username and password for credentials.
    ///
    /// Rejected credentials surface as `InvalidCredentials`, transport
    /// failures as `Http`.
    #[instrument(skip_all)]
    pub async fn login(&self, username: &str, password: &Secret<String>) -> Result<Credentials> {
        let response = token::password_grant(
            &self.http,
            &self.endpoints.token_url(),
            &self.client,
            username,
            password.expose(),
        )
        .await?;
        info!(client_id = %self.client.client_id, "password login succeeded");
        Credentials::from_grant(response, &self.client.client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_flow(base_url: String) -> PasswordFlow {
        let config = OAuthConfig {
            base_url,
            ..OAuthConfig::default()
        };
        PasswordFlow::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn login_returns_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("password=hunter2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "refresh_token": "R",
                "expires_in": 600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = test_flow(server.uri())
            .login("user", &Secret::new("hunter2".to_string()))
            .await
            .unwrap();
        assert_eq!(creds.access_token.as_deref(), Some("A"));
        assert_eq!(creds.client_id, crate::constants::WEBAPP_CLIENT_ID);
    }

    #[tokio::test]
    async fn bad_password_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let err = test_flow(server.uri())
            .login("user", &Secret::new("wrong".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn unreachable_host_is_connectivity_error() {
        let err = test_flow("http://127.0.0.1:1".into())
            .login("user", &Secret::new("pw".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.requires_reauth());
    }
}
