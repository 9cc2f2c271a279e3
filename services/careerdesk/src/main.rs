//! careerdesk command-line client
//!
//! Talks to the careerdesk backend with a session persisted on disk:
//! 1. Loads config (`--config`, CAREERDESK_CONFIG, or ./careerdesk.toml)
//! 2. Restores the stored session, if any
//! 3. Runs one command, refreshing the access token transparently on 401
//! 4. Prints the result as JSON on stdout; logs go to stderr

mod commands;
mod config;
mod error;

use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{AuthenticatedHttpClient, LoggingNavigator};
use clap::Parser;
use session_auth::FileStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // JSON logs on stderr, LOG_LEVEL / RUST_LOG filtering
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = Config::resolve_path(cli.config);
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        login_configured = config.login.is_some(),
        "configuration loaded"
    );

    let store = FileStore::open(config.session.store_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open session store {}",
                config.session.store_path.display()
            )
        })?;
    info!(path = %store.path().display(), "session store ready");

    let client = AuthenticatedHttpClient::new(
        config.client_config(),
        Arc::new(store),
        Arc::new(LoggingNavigator),
    )
    .await
    .context("failed to initialise api client")?;

    let output = commands::execute(&client, &cli.command, config.login.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
