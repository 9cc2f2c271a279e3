//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults. The sign-in
//! password comes from CAREERDESK_PASSWORD or password_file and is never
//! stored in the TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use api_client::ClientConfig;
use common::Secret;
use serde::Deserialize;

pub const PASSWORD_ENV: &str = "CAREERDESK_PASSWORD";
pub const DEFAULT_CONFIG_PATH: &str = "careerdesk.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub login: Option<LoginConfig>,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_secs: u64,
}

/// Where the session survives between invocations
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub store_path: PathBuf,
}

/// Credentials for the `login` command
#[derive(Debug, Deserialize)]
pub struct LoginConfig {
    pub email: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// File holding the password (alternative to CAREERDESK_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_skew() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. CAREERDESK_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(login) = config.login.as_mut() {
            if let Ok(password) = std::env::var(PASSWORD_ENV) {
                login.password = Some(Secret::new(password));
            } else if let Some(ref file) = login.password_file {
                let password = std::fs::read_to_string(file).map_err(|e| {
                    common::Error::Config(format!(
                        "failed to read password_file {}: {e}",
                        file.display()
                    ))
                })?;
                let password = Secret::new(password.trim().to_owned());
                if !password.is_empty() {
                    login.password = Some(password);
                }
            }
        }

        Ok(config)
    }

    /// Config path from `--config` / CAREERDESK_CONFIG, or the default.
    pub fn resolve_path(cli_path: Option<PathBuf>) -> PathBuf {
        cli_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            refresh_skew: Duration::from_secs(self.api.refresh_skew_secs),
        }
    }
}
