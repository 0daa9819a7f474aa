//! Interactive login
//!
//! Runs the configured authorization flow, or resumes from a stored refresh
//! token when one is available.

use anyhow::{Context, Result, bail};
use climate_auth::{Credentials, DeviceAuthFlow, PasswordFlow, PkceFlow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, FlowKind};

/// Obtain credentials for the API client.
///
/// A stored refresh token skips the interactive flow; the token manager
/// exchanges it for an access token on first use.
pub async fn login(http: &reqwest::Client, config: &Config) -> Result<Credentials> {
    if let Some(refresh_token) = &config.auth.refresh_token {
        let client_id = resume_client_id(config)?;
        info!(%client_id, "resuming from stored refresh token");
        return Ok(Credentials::from_refresh_token(
            refresh_token.expose().as_str(),
            client_id,
        ));
    }

    match config.auth.flow {
        FlowKind::Device => device_login(http, config).await,
        FlowKind::Password => password_login(http, config).await,
        FlowKind::Pkce => pkce_login(http, config).await,
    }
}

fn resume_client_id(config: &Config) -> Result<String> {
    if let Some(client_id) = &config.auth.client_id {
        return Ok(client_id.clone());
    }
    match config.oauth.device_clients.first() {
        Some(client) => Ok(client.client_id.clone()),
        None => bail!("auth.client_id is required when no device clients are configured"),
    }
}

async fn device_login(http: &reqwest::Client, config: &Config) -> Result<Credentials> {
    let flow = DeviceAuthFlow::new(http.clone(), &config.oauth);
    let mut session = flow
        .start()
        .await
        .context("failed to start device authorization")?;

    eprintln!(
        "Open {} and confirm code {} to authorize this device.",
        session.verification_uri, session.user_code
    );

    let deadline = Instant::now() + Duration::from_secs(config.auth.device_timeout_secs);
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = flow.wait(&mut session, deadline, &cancel).await;
    interrupt.abort();

    let credentials = result
        .map_err(climate_client::Error::from)
        .context("device authorization did not complete")?;
    info!(state = ?session.state, "device authorized");
    Ok(credentials)
}

async fn password_login(http: &reqwest::Client, config: &Config) -> Result<Credentials> {
    let Some(username) = config.auth.username.as_deref() else {
        bail!("auth.username is required for the password flow");
    };
    let Some(password) = &config.auth.password else {
        bail!("password flow needs CLIMATE_PASSWORD or auth.password_file");
    };
    let credentials = PasswordFlow::new(http.clone(), &config.oauth)
        .login(username, password)
        .await
        .context("password login failed")?;
    Ok(credentials)
}

async fn pkce_login(http: &reqwest::Client, config: &Config) -> Result<Credentials> {
    let pkce = config
        .oauth
        .pkce
        .clone()
        .context("auth.flow = \"pkce\" requires an [oauth.pkce] section")?;
    let flow = PkceFlow::new(http.clone(), config.oauth.endpoints(), pkce)?;
    let session = flow.generate();

    eprintln!("Open this URL and sign in:\n{}", session.authorization_url);
    eprintln!("Then paste the full URL you were redirected to:");

    let mut redirect = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut redirect)
        .await
        .context("failed to read redirect URL from stdin")?;

    let credentials = flow
        .complete(&session, redirect.trim())
        .await
        .context("authorization code exchange failed")?;
    Ok(credentials)
}
