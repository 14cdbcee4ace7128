//! Application configuration.

use crate::Args;
use pricestep_alerts::StepMenu;
use pricestep_engine::{FirstObservationPolicy, SchedulerConfig};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Poll interval must be at least 1 second, got {0}")]
    InvalidInterval(u64),
    #[error("{name} must be at least 1, got {value}")]
    InvalidConcurrency { name: &'static str, value: usize },
    #[error("BOT_TOKEN is not set")]
    MissingToken,
    #[error("BOT_TOKEN is malformed, expected <digits>:<secret>")]
    MalformedToken,
    #[error("Invalid step options {input:?}: {reason}")]
    InvalidStepOptions { input: String, reason: String },
    #[error("Invalid first observation policy: {0}")]
    InvalidPolicy(String),
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub database_url: String,
    pub scheduler: SchedulerConfig,
    pub step_menu: StepMenu,
    pub quote: String,
    pub bybit_url: String,
}

impl AppConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let bot_token = args
            .bot_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;
        if !is_valid_token(&bot_token) {
            return Err(ConfigError::MalformedToken);
        }

        if args.poll_interval_seconds < 1 {
            return Err(ConfigError::InvalidInterval(args.poll_interval_seconds));
        }
        if args.price_fetch_concurrency < 1 {
            return Err(ConfigError::InvalidConcurrency {
                name: "price-fetch-concurrency",
                value: args.price_fetch_concurrency,
            });
        }
        if args.notify_concurrency < 1 {
            return Err(ConfigError::InvalidConcurrency {
                name: "notify-concurrency",
                value: args.notify_concurrency,
            });
        }

        let step_menu: StepMenu =
            args.default_step_options
                .parse()
                .map_err(|e: pricestep_core::AlertError| ConfigError::InvalidStepOptions {
                    input: args.default_step_options.clone(),
                    reason: e.to_string(),
                })?;

        let first_observation: FirstObservationPolicy = args
            .first_observation
            .parse()
            .map_err(|_| ConfigError::InvalidPolicy(args.first_observation.clone()))?;

        Ok(Self {
            bot_token,
            database_url: args.database_url,
            scheduler: SchedulerConfig {
                poll_interval: Duration::from_secs(args.poll_interval_seconds),
                price_fetch_concurrency: args.price_fetch_concurrency,
                notify_concurrency: args.notify_concurrency,
                first_observation,
            },
            step_menu,
            quote: args.quote.trim().to_uppercase(),
            bybit_url: args.bybit_url,
        })
    }

    /// Directory that must exist before SQLite can create the database file.
    pub fn database_dir(&self) -> Option<PathBuf> {
        sqlite_parent_dir(&self.database_url)
    }
}

/// Telegram tokens look like `123456789:AAH...`.
fn is_valid_token(token: &str) -> bool {
    match token.split_once(':') {
        Some((id, secret)) => {
            !id.is_empty()
                && id.chars().all(|c| c.is_ascii_digit())
                && !secret.is_empty()
                && !secret.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn sqlite_parent_dir(url: &str) -> Option<PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    PathBuf::from(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
}
