//! Price Step Bot - Headless Server
//!
//! Polls exchange prices and sends a Telegram message each time a token
//! moves by the user's chosen step.

mod config;

use clap::Parser;
use config::{AppConfig, ConfigError};
use pricestep_alerts::{AlertService, Database, DbError, TelegramBot, TelegramNotifier};
use pricestep_engine::Scheduler;
use pricestep_feeds::{BybitRestFetcher, FeedError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Time allowed for an in-flight tick to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Daily log files kept next to `--log-file`.
const LOG_FILES_KEPT: usize = 7;

/// Price Step Bot CLI
#[derive(Parser, Debug)]
#[command(name = "pricestep-bot")]
#[command(about = "Telegram alerts on step-sized crypto price moves", long_about = None)]
struct Args {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://data/database.sqlite3")]
    database_url: String,

    /// Seconds between price checks
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value_t = 60)]
    poll_interval_seconds: u64,

    /// Comma-separated step menu offered by /add
    #[arg(long, env = "DEFAULT_STEP_OPTIONS", default_value = pricestep_alerts::DEFAULT_STEP_OPTIONS)]
    default_step_options: String,

    /// First price seen for an alert without baseline: adopt, fire
    #[arg(long, env = "FIRST_OBSERVATION", default_value = "adopt")]
    first_observation: String,

    /// Quote currency appended to symbols
    #[arg(long, env = "QUOTE_CURRENCY", default_value = "USDT")]
    quote: String,

    /// Bybit REST base URL
    #[arg(long, env = "BYBIT_BASE_URL", default_value = "https://api.bybit.com")]
    bybit_url: String,

    /// Maximum concurrent price lookups per tick
    #[arg(long, default_value_t = 8)]
    price_fetch_concurrency: usize,

    /// Maximum concurrent notification deliveries
    #[arg(long, default_value_t = 4)]
    notify_concurrency: usize,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to this file, rotated daily
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Database unavailable: {0}")]
    Db(#[from] DbError),
    #[error("Price feed setup failed: {0}")]
    Feed(#[from] FeedError),
    #[error("Cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// `logs/bot.log` rotates to `logs/bot.log.YYYY-MM-DD`.
fn file_appender(path: &Path) -> Result<RollingFileAppender, InitError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("pricestep-bot.log");

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(LOG_FILES_KEPT)
        .build(dir)
}

/// Compact stderr logging, plus an optional rotating file. `RUST_LOG`
/// overrides `level`. The returned guard flushes the file writer on drop.
fn init_logging(level: &str, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(parse_level(level).into())
        .from_env_lossy();

    let mut guard = None;
    let file_layer = match log_file.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        Some(Err(e)) => {
            eprintln!("Cannot open log file, logging to stderr only: {}", e);
            None
        }
        None => None,
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
    guard
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    info!("🚀 Price Step Bot starting...");
    info!("  Database: {}", config.database_url);
    info!("  Poll interval: {}s", config.scheduler.poll_interval.as_secs());
    info!("  First observation: {}", config.scheduler.first_observation);
    info!("  Quote: {} via {}", config.quote, config.bybit_url);
    info!(
        "  Concurrency: {} price lookups, {} deliveries",
        config.scheduler.price_fetch_concurrency, config.scheduler.notify_concurrency
    );

    if let Some(dir) = config.database_dir() {
        tokio::fs::create_dir_all(&dir).await?;
    }
    let db = Arc::new(Database::connect(&config.database_url).await?);
    info!("Database ready");

    let prices = Arc::new(BybitRestFetcher::new(&config.bybit_url, &config.quote)?);

    let service = AlertService::new(db.clone(), prices.clone());
    let bot = Arc::new(TelegramBot::new(
        &config.bot_token,
        service,
        config.step_menu.clone(),
    ));
    let notifier = Arc::new(TelegramNotifier::new(bot.bot().clone()));

    let scheduler = Scheduler::new(config.scheduler.clone(), prices, db, notifier);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });
    let bot_handle = tokio::spawn(bot.run());

    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
    }

    warn!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_handle)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop within {}s", SHUTDOWN_GRACE.as_secs());
    }
    if tokio::time::timeout(Duration::from_secs(5), bot_handle)
        .await
        .is_err()
    {
        warn!("Telegram dispatcher did not stop in time");
    }

    info!("👋 Price Step Bot stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref());

    let result = match AppConfig::from_args(args) {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["pricestep-bot", "--bot-token", "1:x"]).unwrap();
        assert_eq!(args.price_fetch_concurrency, 8);
        assert_eq!(args.notify_concurrency, 4);
        assert_eq!(args.bot_token.as_deref(), Some("1:x"));
        assert_eq!(args.log_file, None);
    }

    #[test]
    fn test_log_file_flag() {
        let args = Args::try_parse_from([
            "pricestep-bot",
            "--log-file",
            "logs/bot.log",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.log_file, Some(PathBuf::from("logs/bot.log")));
        assert_eq!(parse_level(&args.log_level), LevelFilter::DEBUG);
    }

    #[test]
    fn test_parse_level_falls_back_to_info() {
        assert_eq!(parse_level("WARN"), LevelFilter::WARN);
        assert_eq!(parse_level("verbose"), LevelFilter::INFO);
    }

    #[test]
    fn test_file_appender_writes_into_parent_dir() {
        let dir = std::env::temp_dir().join(format!("pricestep-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let appender = file_appender(&dir.join("bot.log"));
        assert!(appender.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::try_parse_from([
            "pricestep-bot",
            "--bot-token",
            "1:x",
            "--poll-interval-seconds",
            "15",
            "--first-observation",
            "fire",
            "--notify-concurrency",
            "2",
        ])
        .unwrap();
        assert_eq!(args.poll_interval_seconds, 15);
        assert_eq!(args.first_observation, "fire");
        assert_eq!(args.notify_concurrency, 2);
    }

    #[test]
    fn test_config_error_is_startup_error() {
        let err: StartupError = ConfigError::MissingToken.into();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: BOT_TOKEN is not set"
        );
    }
}
