//! Application configuration.

use std::path::PathBuf;
use std::str::FromStr;

use paperscan_core::defaults::{
    ENV_AI_SERVICE_KEY, ENV_AI_SERVICE_URL, ENV_PAPERLESS_TOKEN, ENV_PAPERLESS_URL,
    MAX_FILE_SIZE_BYTES, STAGING_DIR_NAME, STORAGE_SAFETY_MARGIN_BYTES,
};
use paperscan_core::{Error, Result};

use crate::upload::UploadStrategy;

/// Runtime configuration for the paperscan client.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paperless_url: String,
    pub paperless_token: String,
    /// App-private directory for the database and staged files.
    pub data_dir: PathBuf,
    pub database_url: String,
    pub ai_service_url: Option<String>,
    pub ai_service_key: Option<String>,
    pub premium: bool,
    pub wifi_only: bool,
    pub upload_strategy: UploadStrategy,
    pub max_file_size: u64,
    pub storage_safety_margin: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PAPERLESS_URL` | required | Document server base URL |
    /// | `PAPERLESS_TOKEN` | required | API token |
    /// | `PAPERSCAN_DATA_DIR` | `./paperscan-data` | Database and staging directory |
    /// | `DATABASE_URL` | `sqlite://<data dir>/paperscan.db?mode=rwc` | Queue and usage store |
    /// | `AI_SERVICE_URL` | unset | Remote AI analysis service |
    /// | `AI_SERVICE_KEY` | unset | Bearer key for the AI service |
    /// | `PAPERSCAN_PREMIUM` | `false` | Premium entitlement (enables remote AI) |
    /// | `AI_WIFI_ONLY` | `false` | Only run AI analysis on WiFi |
    /// | `UPLOAD_STRATEGY` | `queue` | `queue` or `immediate` |
    /// | `MAX_FILE_SIZE_BYTES` | 100 MiB | Per-file size limit |
    /// | `STORAGE_SAFETY_MARGIN_BYTES` | 50 MiB | Free space kept in reserve |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let paperless_url = get(ENV_PAPERLESS_URL)
            .ok_or_else(|| Error::Config(format!("{ENV_PAPERLESS_URL} is not set")))?
            .trim_end_matches('/')
            .to_string();
        let paperless_token = get(ENV_PAPERLESS_TOKEN)
            .ok_or_else(|| Error::Config(format!("{ENV_PAPERLESS_TOKEN} is not set")))?;

        let data_dir = PathBuf::from(
            get("PAPERSCAN_DATA_DIR").unwrap_or_else(|| "./paperscan-data".to_string()),
        );
        let database_url = get("DATABASE_URL").unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", data_dir.join("paperscan.db").display())
        });

        let upload_strategy = match get("UPLOAD_STRATEGY") {
            Some(v) => v.parse()?,
            None => UploadStrategy::QueueFirst,
        };

        Ok(Self {
            paperless_url,
            paperless_token,
            data_dir,
            database_url,
            ai_service_url: get(ENV_AI_SERVICE_URL),
            ai_service_key: get(ENV_AI_SERVICE_KEY),
            premium: parse_flag(get("PAPERSCAN_PREMIUM"))?,
            wifi_only: parse_flag(get("AI_WIFI_ONLY"))?,
            upload_strategy,
            max_file_size: parse_num(get("MAX_FILE_SIZE_BYTES"), MAX_FILE_SIZE_BYTES)?,
            storage_safety_margin: parse_num(
                get("STORAGE_SAFETY_MARGIN_BYTES"),
                STORAGE_SAFETY_MARGIN_BYTES,
            )?,
        })
    }

    /// Directory holding durable copies of queued files.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join(STAGING_DIR_NAME)
    }
}

fn parse_flag(value: Option<String>) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(Error::Config(format!("invalid boolean: {other}"))),
    }
}

fn parse_num(value: Option<String>, default: u64) -> Result<u64> {
    match value {
        None => Ok(default),
        Some(v) => u64::from_str(v.trim()).map_err(|e| Error::Config(format!("{v}: {e}"))),
    }
}
