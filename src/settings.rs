//! Runtime configuration, loaded from an optional `config.toml` merged with `TPC__*`
//! environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// The SMTP relay used to send absentee notices.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub sender: String,
    /// Comma-separated addresses copied on every notice.
    #[serde(default)]
    pub cc: String,
    /// When set, every notice goes to this address instead of the parent.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EodSettings {
    pub max_retries: usize,
    pub min_backoff_secs: u64,
}

impl Default for EodSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_backoff_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub session_file: PathBuf,
    pub report_dir: PathBuf,
    #[serde(default)]
    pub smtp: Option<SmtpSettings>,
    #[serde(default)]
    pub eod: EodSettings,
}

impl Settings {
    /// Loads settings from `config.toml` (if present) and the environment.
    ///
    /// `DATABASE_URL` is honoured as the database default so the diesel CLI and this tool
    /// can share a `.env` file.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "tpc.sqlite3".to_string());

        let settings = Config::builder()
            .set_default("database_url", database_url)?
            .set_default("session_file", ".tpc-session")?
            .set_default("report_dir", "reports")?
            .set_default("eod.max_retries", 5)?
            .set_default("eod.min_backoff_secs", 1)?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("TPC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
