//! Error types for OAuth authentication operations

use std::time::Duration;

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("device authorization failed: {0}")]
    DeviceAuthorization(String),

    #[error("device authorization not completed within {}s", .0.as_secs())]
    DeviceAuthTimeout(Duration),

    #[error("device authorization cancelled")]
    Cancelled,

    #[error("authorization state mismatch, redirect rejected")]
    StateMismatch,

    #[error("invalid redirect URL: {0}")]
    InvalidRedirect(String),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("invalid OAuth configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the caller must run an authorization flow again.
    ///
    /// These are never retried internally.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::TokenExchange(_)
                | Error::InvalidCredentials(_)
                | Error::DeviceAuthorization(_)
                | Error::StateMismatch
                | Error::NoRefreshToken
        )
    }

    /// Transport failures; retrying is the caller's decision.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
