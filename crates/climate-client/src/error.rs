//! Error types for API client operations

use std::time::Duration;

/// Errors surfaced to callers of the API client.
///
/// Internal retries (one after a 401, bounded after a 429) are invisible on
/// success; only their exhaustion shows up here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Credentials are invalid, expired or revoked. The host must run an
    /// authorization flow again; never retried internally.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-2xx application response, including an exhausted 429 budget.
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport failure. Retrying is the caller's decision.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The user did not finish device authorization before the deadline.
    #[error("device authorization not completed within {}s", .0.as_secs())]
    DeviceAuthTimeout(Duration),

    #[error("account has no homes")]
    NoHomes,

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl Error {
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<climate_auth::Error> for Error {
    fn from(err: climate_auth::Error) -> Self {
        match err {
            climate_auth::Error::Http(msg) => Error::Connection(msg),
            climate_auth::Error::DeviceAuthTimeout(after) => Error::DeviceAuthTimeout(after),
            other => Error::Auth(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidResponse(err.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_by_class() {
        let err: Error = climate_auth::Error::InvalidCredentials("revoked".into()).into();
        assert!(err.requires_reauth());

        let err: Error = climate_auth::Error::Http("reset".into()).into();
        assert!(err.is_transient());
        assert!(!err.requires_reauth());

        let err: Error = climate_auth::Error::DeviceAuthTimeout(Duration::from_secs(300)).into();
        assert!(matches!(err, Error::DeviceAuthTimeout(d) if d.as_secs() == 300));
        assert!(!err.requires_reauth());
    }

    #[test]
    fn api_error_exposes_status() {
        let err = Error::Api {
            status: 503,
            body: "down".into(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "API returned 503: down");
        assert_eq!(Error::NoHomes.status(), None);
    }
}
