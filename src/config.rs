//! Configuration management

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Bot configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// Generation provider API token
    pub provider_token: String,

    /// Model version for /video jobs
    pub video_model_version: String,

    /// Model version for /image jobs
    pub image_model_version: String,

    /// Public base URL the provider posts callbacks to
    pub webhook_base_url: String,

    /// Bind address for the webhook ingress
    pub bind_addr: SocketAddr,

    /// SQLite database path for the job store
    pub db_path: PathBuf,

    /// Telegram user ids allowed to submit jobs (empty = everyone)
    pub allowed_users: Vec<i64>,

    /// Branding prefix applied to outgoing messages by the transport
    pub brand_prefix: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;

        let provider_token =
            std::env::var("PROVIDER_API_TOKEN").context("PROVIDER_API_TOKEN must be set")?;

        let video_model_version = std::env::var("VIDEO_MODEL_VERSION").unwrap_or_default();
        let image_model_version = std::env::var("IMAGE_MODEL_VERSION").unwrap_or_default();

        let webhook_base_url =
            std::env::var("WEBHOOK_BASE_URL").context("WEBHOOK_BASE_URL must be set")?;

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let db_path = std::env::var("JOBS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("jobs.db"));

        let allowed_users = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        let brand_prefix =
            std::env::var("BRAND_PREFIX").unwrap_or_else(|_| "[genbot]".to_string());

        Ok(Self {
            telegram_token,
            provider_token,
            video_model_version,
            image_model_version,
            webhook_base_url,
            bind_addr,
            db_path,
            allowed_users,
            brand_prefix,
        })
    }

    /// Full callback URL handed to the provider at job creation.
    pub fn webhook_url(&self) -> String {
        format!(
            "{}/webhooks/jobs",
            self.webhook_base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_url_joins_cleanly() {
        let config = Config {
            telegram_token: String::new(),
            provider_token: String::new(),
            video_model_version: String::new(),
            image_model_version: String::new(),
            webhook_base_url: "https://bot.example/".to_string(),
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            db_path: PathBuf::from("jobs.db"),
            allowed_users: vec![],
            brand_prefix: String::new(),
        };
        assert_eq!(config.webhook_url(), "https://bot.example/webhooks/jobs");
    }

    #[test]
    fn test_allowed_users_csv_parsing() {
        let csv = "12345, invalid, 67890, ";
        let users: Vec<i64> = csv.split(',').filter_map(|s| s.trim().parse().ok()).collect();
        assert_eq!(users, vec![12345i64, 67890]);
    }
}
