//! OAuth token endpoint exchanges
//!
//! Handles the token endpoint interactions shared by every flow:
//! 1. Refresh (proactive and after a 401)
//! 2. Authorization code exchange (PKCE flow completion)
//! 3. Resource owner password grant
//!
//! Device-code polling also POSTs to the token endpoint but interprets the
//! pending/slow_down errors itself (see `device`).

use serde::{Deserialize, Serialize};

use crate::config::ClientIdentity;
use crate::constants::DEFAULT_EXPIRES_IN_SECS;
use crate::error::{Error, Result};

/// Response from the token endpoint for every grant type.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts this to an absolute unix millisecond timestamp when storing
/// the credential.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Refresh responses may omit it, meaning the current one stays valid
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// RFC 6749 error body returned with 4xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// Best-effort parse; a non-JSON body keeps the raw text as description.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            error: String::new(),
            error_description: Some(body.to_string()),
        })
    }
}

/// Refresh an access token using a refresh token.
///
/// Must use the same client the refresh token was issued to. A 400/401/403
/// means the refresh token is revoked or expired and the user has to log in
/// again.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

/// Exchange an authorization code for tokens (PKCE flow completion).
///
/// The verifier proves this client started the flow that produced `code`.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    identity: &ClientIdentity,
    redirect_uri: &str,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("code_verifier", verifier),
        ("client_id", identity.client_id.as_str()),
        ("redirect_uri", redirect_uri),
    ];
    if let Some(secret) = &identity.client_secret {
        form.push(("client_secret", secret.expose().as_str()));
    }

    let response = client
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Resource owner password grant.
///
/// The vendor may disable this grant at any time; a rejection surfaces as
/// `InvalidCredentials` with the server's error description.
pub async fn password_grant(
    client: &reqwest::Client,
    token_url: &str,
    identity: &ClientIdentity,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "password"),
        ("client_id", identity.client_id.as_str()),
        ("scope", identity.scope.as_str()),
        ("username", username),
        ("password", password),
    ];
    if let Some(secret) = &identity.client_secret {
        form.push(("client_secret", secret.expose().as_str()));
    }

    let response = client
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("password grant request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if status.is_client_error() {
            let err = TokenErrorResponse::parse(&body);
            let reason = err.error_description.unwrap_or(err.error);
            return Err(Error::InvalidCredentials(format!(
                "password grant rejected ({status}): {reason}"
            )));
        }
        return Err(Error::TokenExchange(format!(
            "password grant returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}
