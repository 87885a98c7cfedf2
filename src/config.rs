//! Environment-driven configuration.
//!
//! Everything is read once at startup from the process environment (a
//! `.env` file is loaded first when present). Values that are absent fall
//! back to the production Ontopo defaults; values that are present but
//! nonsensical fail startup instead of being silently corrected.

use std::time::Duration;

use anyhow::{Context, bail};
use secrecy::SecretString;

const DEFAULT_BASE_URL: &str = "https://ontopo.co.il";
const DEFAULT_DISTRIBUTOR_ID: &str = "15171493";
const DEFAULT_DISTRIBUTOR_VERSION: &str = "7738";
const DEFAULT_TIMEOUT_SECS: u64 = 8;
const DEFAULT_SEARCH_LIMIT: u32 = 10;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub ontopo: OntopoConfig,
    pub server: ServerConfig,
}

/// Connection settings for the Ontopo booking platform.
#[derive(Debug, Clone)]
pub struct OntopoConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Distributor identity sent with every API call.
    pub distributor_id: String,
    /// Distributor client version sent on login.
    pub distributor_version: String,
    /// Per-request timeout. Kept under ten seconds so a stalled upstream
    /// surfaces as a fast, explicit failure.
    pub timeout: Duration,
    /// Maximum venue candidates requested per search.
    pub search_limit: u32,
}

/// Settings for the REST gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, requests must carry this value in `X-API-Key`.
    pub api_key: Option<SecretString>,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let base_url = lookup("ONTOPO_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout_secs = match lookup("ONTOPO_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("ONTOPO_TIMEOUT_SECS is not a number: {raw:?}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if !(1..=9).contains(&timeout_secs) {
            bail!("ONTOPO_TIMEOUT_SECS must be between 1 and 9, got {timeout_secs}");
        }

        let search_limit = match lookup("ONTOPO_SEARCH_LIMIT") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("ONTOPO_SEARCH_LIMIT is not a number: {raw:?}"))?,
            None => DEFAULT_SEARCH_LIMIT,
        };
        if search_limit == 0 {
            bail!("ONTOPO_SEARCH_LIMIT must be at least 1");
        }

        let port = match lookup("BOOKABOO_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("BOOKABOO_PORT is not a valid port: {raw:?}"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            ontopo: OntopoConfig {
                base_url,
                distributor_id: lookup("ONTOPO_DISTRIBUTOR_ID")
                    .unwrap_or_else(|| DEFAULT_DISTRIBUTOR_ID.to_string()),
                distributor_version: lookup("ONTOPO_DISTRIBUTOR_VERSION")
                    .unwrap_or_else(|| DEFAULT_DISTRIBUTOR_VERSION.to_string()),
                timeout: Duration::from_secs(timeout_secs),
                search_limit,
            },
            server: ServerConfig {
                host: lookup("BOOKABOO_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
                api_key: lookup("BOOKABOO_API_KEY")
                    .filter(|key| !key.is_empty())
                    .map(SecretString::from),
            },
        })
    }
}

impl OntopoConfig {
    /// User-Agent header sent on every platform call.
    pub fn user_agent(&self) -> String {
        format!(
            "Bookaboo/{} distributor/{}",
            env!("CARGO_PKG_VERSION"),
            self.distributor_id
        )
    }
}
