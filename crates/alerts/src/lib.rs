//! Alert management and Telegram delivery for the price step bot.
//!
//! This crate provides:
//! - SQLite-backed alert storage (`Database`, an `AlertStore`)
//! - `AlertService` for creating, pausing and editing alerts
//! - The `/add` dialog state machine and step menu
//! - Telegram bot commands and the `TelegramNotifier`

pub mod config;
pub mod db;
pub mod flow;
pub mod message;
pub mod service;
pub mod telegram;

pub use config::{StepMenu, DEFAULT_STEP_OPTIONS};
pub use db::{Database, DbError};
pub use flow::{AddAlertFlow, FlowAction, FlowState};
pub use service::{AddOutcome, AlertService, ServiceError};
pub use telegram::{TelegramBot, TelegramNotifier};
