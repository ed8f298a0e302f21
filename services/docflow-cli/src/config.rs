//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults. A
//! bootstrap access token may come from the DOCFLOW_TOKEN env var, a
//! token_file, or (least preferred) the TOML itself; it is wrapped in
//! `Secret` everywhere so logs never carry it.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// API endpoint settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Session credential settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Where the credential file lives
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// Bootstrap bearer token. Prefer DOCFLOW_TOKEN or token_file over
    /// putting this in the TOML.
    #[serde(default)]
    pub token: Option<Secret<String>>,
    /// Path to a file containing a bootstrap token
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token: None,
            token_file: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    300
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("docflow-credentials.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables.
    ///
    /// Bootstrap token resolution order:
    /// 1. DOCFLOW_TOKEN env var
    /// 2. token_file path from config
    /// 3. token field in the TOML
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // Validate base_url is a valid URL with http(s) scheme
        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        // Validate timeout_secs is non-zero
        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        // Reject an explicitly empty token
        if config.session.token.as_ref().is_some_and(Secret::is_empty) {
            return Err(common::Error::Config("token must not be empty".into()));
        }

        // Resolve bootstrap token: env var takes precedence over file,
        // file over TOML
        if let Ok(token) = std::env::var("DOCFLOW_TOKEN") {
            config.session.token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.session.token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.session.token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or DOCFLOW_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("DOCFLOW_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("docflow.toml")
    }
}
