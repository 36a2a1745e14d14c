use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub providers: ProvidersConfig,
    pub trigger: TriggerConfig,
    pub export: ExportConfig,
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub poll_interval_seconds: u64,
    pub trigger_interval_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub espn_base_url: String,
    pub odds_api_base_url: String,
    pub sport_key: String,
    pub regions: String,
    pub full_game_markets: String,
    pub second_half_markets: String,
    pub odds_requests_per_minute: u32,
    pub second_half_freshness_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub grace_minutes: i64,
    pub email_delay_ms: u64,
    pub from_address: String,
    pub subject_prefix: String,
    /// Calendar date (YYYY-MM-DD) of the Tuesday that opens week 1.
    pub season_week1_start: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
pub struct Secrets {
    pub odds_api_key: Option<String>,
    pub resend_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            odds_api_key: std::env::var("ODDS_API_KEY").ok(),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config/default.toml, overlaying environment variables for secrets.
    pub fn load() -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let config_path = Path::new("config/default.toml");
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AppConfig =
            toml::from_str(&contents).context("Failed to parse config/default.toml")?;

        let secrets = Secrets::from_env();

        Ok((config, secrets))
    }
}
