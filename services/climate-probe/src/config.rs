//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The password and stored refresh token are loaded from CLIMATE_PASSWORD /
//! CLIMATE_REFRESH_TOKEN or their *_file paths, never from the TOML body.

use climate_auth::OAuthConfig;
use climate_client::{ApiHosts, RetryPolicy};
use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const PASSWORD_ENV: &str = "CLIMATE_PASSWORD";
pub const REFRESH_TOKEN_ENV: &str = "CLIMATE_REFRESH_TOKEN";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub api: ApiHosts,
    pub retry: RetryPolicy,
    pub http: HttpConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    #[default]
    Device,
    Password,
    Pkce,
}

/// Login settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub flow: FlowKind,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    pub password_file: Option<PathBuf>,
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
    pub refresh_token_file: Option<PathBuf>,
    /// Client the stored refresh token was issued to; defaults to the
    /// first device client
    pub client_id: Option<String>,
    pub device_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            flow: FlowKind::Device,
            username: None,
            password: None,
            password_file: None,
            refresh_token: None,
            refresh_token_file: None,
            client_id: None,
            device_timeout_secs: climate_auth::DEVICE_AUTH_DEADLINE.as_secs(),
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order, for both the password and the refresh token:
    /// 1. env var
    /// 2. *_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        for (name, url) in [
            ("oauth.base_url", &config.oauth.base_url),
            ("api.legacy_base_url", &config.api.legacy_base_url),
            ("api.room_base_url", &config.api.room_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if config.http.timeout_secs == 0 {
            return Err(common::Error::Config(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }
        if config.auth.device_timeout_secs == 0 {
            return Err(common::Error::Config(
                "auth.device_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.auth.flow == FlowKind::Pkce && config.oauth.pkce.is_none() {
            return Err(common::Error::Config(
                "auth.flow = \"pkce\" requires an [oauth.pkce] section".into(),
            ));
        }

        config.auth.password = load_secret(PASSWORD_ENV, config.auth.password_file.as_deref())?;
        config.auth.refresh_token =
            load_secret(REFRESH_TOKEN_ENV, config.auth.refresh_token_file.as_deref())?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("climate-probe.toml")
    }
}

/// Env var wins over file; an empty file yields no secret.
fn load_secret(env: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|source| common::Error::SecretFile {
        path: file.display().to_string(),
        source,
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| Secret::new(value.to_owned())))
}
