//! Climate probe
//!
//! Single-binary host for the thermostat client that:
//! 1. Loads configuration and runs one login flow
//! 2. Resolves the account's home and its backend generation
//! 3. Prints every zone's canonical state as JSON
//! 4. Prints the current refresh token for the caller to persist

mod config;
mod login;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use climate_client::{RequestDispatcher, ThermostatClient, TokenManager};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs filtered by LOG_LEVEL, then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("starting climate-probe");

    // Install before any client call so refresh and request counters are kept
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    // CLI: --config <path>, --metrics
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let print_metrics = args.iter().any(|a| a == "--metrics");

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        oauth_base_url = %config.oauth.base_url,
        legacy_base_url = %config.api.legacy_base_url,
        room_base_url = %config.api.room_base_url,
        flow = ?config.auth.flow,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let credentials = login::login(&http, &config).await?;
    let tokens = Arc::new(TokenManager::new(
        http.clone(),
        &config.oauth.endpoints(),
        credentials,
    ));

    let mut rotations = tokens.subscribe();
    tokio::spawn(async move {
        while rotations.changed().await.is_ok() {
            if rotations.borrow_and_update().is_some() {
                info!("credentials rotated");
            }
        }
    });

    let dispatcher = RequestDispatcher::new(http, Arc::clone(&tokens)).with_policy(config.retry.clone());
    let client = ThermostatClient::connect(dispatcher, config.api.clone())
        .await
        .context("failed to connect to home")?;
    info!(home_id = %client.home_id(), generation = ?client.generation(), "home resolved");

    let states = client
        .zone_states()
        .await
        .context("failed to fetch zone states")?;
    info!(zones = states.len(), "zone states fetched");
    println!("{}", serde_json::to_string_pretty(&states)?);

    if let Some(credentials) = tokens.credentials().await {
        println!("refresh_token={}", credentials.refresh_token);
    }

    if print_metrics {
        eprintln!("{}", prometheus.render());
    }

    Ok(())
}
