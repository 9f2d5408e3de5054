//! Configuration module for remitd.
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseBackend {
    #[default]
    Mongodb,
    Memory,
}

impl FromStr for DatabaseBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "mongodb" | "mongo" => Ok(Self::Mongodb),
            other => bail!("DATABASE_BACKEND must be 'mongodb' or 'memory', got '{other}'"),
        }
    }
}

/// Explorer network (Polygonscan endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Amoy,
    Mainnet,
}

impl Network {
    pub fn explorer_url(&self) -> &'static str {
        match self {
            Self::Amoy => "https://api-amoy.polygonscan.com/api",
            Self::Mainnet => "https://api.polygonscan.com/api",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // HTTP
    pub port: u16,
    /// Allowed CORS origin. `None` allows any origin.
    pub client_origin: Option<String>,

    // Auth
    pub jwt_secret: String,
    /// Shared secret for the manual KYC approval route.
    pub admin_token: Option<String>,

    // Storage
    pub database_backend: DatabaseBackend,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    pub upload_dir: PathBuf,
    pub db_max_retries: u32,

    // Chain
    pub rpc_url: Option<String>,
    pub network: Network,
    pub explorer_api_url: Option<String>,
    pub explorer_api_key: Option<String>,
    pub coingecko_api_url: String,

    // Background work
    pub poll_initial_delay: Duration,
    pub poll_interval: Duration,
    pub poll_max_checks: u32,
    pub kyc_watch_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            client_origin: None,
            jwt_secret: String::new(),
            admin_token: None,
            database_backend: DatabaseBackend::Mongodb,
            mongodb_uri: None,
            mongodb_database: "remittance".to_string(),
            upload_dir: PathBuf::from("uploads"),
            db_max_retries: 3,
            rpc_url: None,
            network: Network::Amoy,
            explorer_api_url: None,
            explorer_api_key: None,
            coingecko_api_url: "https://api.coingecko.com/api/v3".to_string(),
            poll_initial_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(15),
            poll_max_checks: 5,
            kyc_watch_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables. `.env` is loaded by
    /// the binary before this runs.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_backend = match optional("DATABASE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.database_backend,
        };

        let mongodb_uri = optional("MONGODB_URI");
        if database_backend == DatabaseBackend::Mongodb && mongodb_uri.is_none() {
            bail!("MONGODB_URI must be set when DATABASE_BACKEND is mongodb");
        }

        let network = match env::var("POLYGON_NETWORK")
            .unwrap_or_else(|_| "amoy".to_string())
            .to_lowercase()
            .as_str()
        {
            "mainnet" => Network::Mainnet,
            _ => Network::Amoy,
        };

        let rpc_url = optional("RPC_URL");
        if let Some(url) = &rpc_url {
            url::Url::parse(url).with_context(|| format!("RPC_URL is not a valid URL: {url}"))?;
        }

        let explorer_api_url = optional("EXPLORER_API_URL");
        if let Some(url) = &explorer_api_url {
            url::Url::parse(url)
                .with_context(|| format!("EXPLORER_API_URL is not a valid URL: {url}"))?;
        }

        Ok(Self {
            port: parse_or("PORT", defaults.port)?,
            client_origin: optional("CLIENT_ORIGIN").filter(|o| o != "*"),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            admin_token: optional("ADMIN_TOKEN"),
            database_backend,
            mongodb_uri,
            mongodb_database: optional("MONGODB_DATABASE").unwrap_or(defaults.mongodb_database),
            upload_dir: optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            db_max_retries: parse_or("DB_MAX_RETRIES", defaults.db_max_retries)?,
            rpc_url,
            network,
            explorer_api_url,
            explorer_api_key: optional("POLYGONSCAN_API_KEY").or_else(|| optional("ETHERSCAN_API_KEY")),
            coingecko_api_url: optional("COINGECKO_API_URL").unwrap_or(defaults.coingecko_api_url),
            poll_initial_delay: Duration::from_secs(parse_or("POLL_INITIAL_DELAY_SECS", 3)?),
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 15)?),
            poll_max_checks: parse_or("POLL_MAX_CHECKS", defaults.poll_max_checks)?,
            kyc_watch_interval: Duration::from_secs(parse_or("KYC_WATCH_INTERVAL_SECS", 30)?),
        })
    }

    /// Explorer base URL: explicit override or the configured network's endpoint.
    pub fn explorer_url(&self) -> String {
        self.explorer_api_url
            .clone()
            .unwrap_or_else(|| self.network.explorer_url().to_string())
    }
}

/// Read a variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
