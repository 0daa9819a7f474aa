//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge used during the
//! authorization-code flow, plus the anti-CSRF `state`. The verifier stays
//! with the caller and is sent during token exchange; the challenge and
//! state travel in the authorization URL. The `state` echoed back in the
//! redirect is the only CSRF defense, so `complete` compares it before any
//! request reaches the token endpoint.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use url::Url;

use crate::config::{OAuthEndpoints, PkceConfig};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::token;

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 (no padding) gives 86
/// characters, inside RFC 7636's 43-128 range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random opaque `state` value (32 bytes, base64url).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extract `(code, state)` from the redirect URL the browser landed on.
///
/// The provider's own `error` parameter is reported as an invalid redirect.
pub fn parse_redirect(redirect_url: &str) -> Result<(String, String)> {
    let url = Url::parse(redirect_url.trim())
        .map_err(|e| Error::InvalidRedirect(format!("not a URL: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(Error::InvalidRedirect(format!(
                    "authorization denied: {value}"
                )));
            }
            _ => {}
        }
    }

    match (
        code.filter(|c| !c.is_empty()),
        state.filter(|s| !s.is_empty()),
    ) {
        (Some(code), Some(state)) => Ok((code, state)),
        (None, _) => Err(Error::InvalidRedirect("missing code parameter".into())),
        (_, None) => Err(Error::InvalidRedirect("missing state parameter".into())),
    }
}

/// One authorization-code attempt.
///
/// Created by `PkceFlow::generate`, kept by the caller until the redirect
/// arrives, then passed to `PkceFlow::complete`.
#[derive(Clone)]
pub struct PkceSession {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
    pub authorization_url: String,
}

impl PkceSession {
    /// Whether `returned` is the state this session sent.
    pub fn verify_state(&self, returned: &str) -> bool {
        self.state == returned
    }
}

impl std::fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceSession")
            .field("authorization_url", &self.authorization_url)
            .finish_non_exhaustive()
    }
}

/// Authorization-code flow with PKCE for one configured client.
pub struct PkceFlow {
    http: reqwest::Client,
    endpoints: OAuthEndpoints,
    config: PkceConfig,
    authorize_url: Url,
}

impl PkceFlow {
    /// Fails if the authorize endpoint or redirect URI is not a valid URL.
    pub fn new(http: reqwest::Client, endpoints: OAuthEndpoints, config: PkceConfig) -> Result<Self> {
        let authorize_url = Url::parse(&endpoints.authorize_url())
            .map_err(|e| Error::Config(format!("authorize URL: {e}")))?;
        Url::parse(&config.redirect_uri)
            .map_err(|e| Error::Config(format!("redirect_uri: {e}")))?;
        Ok(Self {
            http,
            endpoints,
            config,
            authorize_url,
        })
    }

    /// Fresh verifier, challenge and state, and the URL the user must open.
    pub fn generate(&self) -> PkceSession {
        let code_verifier = generate_verifier();
        let code_challenge = compute_challenge(&code_verifier);
        let state = generate_state();

        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.client.scope)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &state);

        PkceSession {
            code_verifier,
            code_challenge,
            state,
            authorization_url: url.into(),
        }
    }

    /// Exchange an authorization code for credentials.
    ///
    /// Does not look at `state`; callers that hold the redirect URL should
    /// use `complete` instead.
    pub async fn exchange(&self, code: &str, verifier: &str) -> Result<Credentials> {
        let response = token::exchange_code(
            &self.http,
            &self.endpoints.token_url(),
            &self.config.client,
            &self.config.redirect_uri,
            code,
            verifier,
        )
        .await?;
        info!(client_id = %self.config.client.client_id, "authorization code exchanged");
        Credentials::from_grant(response, &self.config.client.client_id)
    }

    /// Parse the redirect, check its state against the session, then exchange.
    pub async fn complete(&self, session: &PkceSession, redirect_url: &str) -> Result<Credentials> {
        let (code, state) = parse_redirect(redirect_url)?;
        if !session.verify_state(&state) {
            warn!("redirect state does not match session, aborting exchange");
            return Err(Error::StateMismatch);
        }
        self.exchange(&code, &session.code_verifier).await
    }
}
