//! Telegram bot handlers and alert delivery.

use crate::config::StepMenu;
use crate::flow::{AddAlertFlow, FlowAction};
use crate::message::{format_alert_line, format_alert_message};
use crate::service::{AddOutcome, AlertService, ServiceError};
use async_trait::async_trait;
use dashmap::DashMap;
use pricestep_core::{AlertError, AlertId, Step};
use pricestep_engine::{DeliveryError, Notifier, PriceMove};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Symbols listed by `/tokens` before truncating.
const MAX_LISTED_SYMBOLS: usize = 300;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Add an alert. Usage: /add [SYMBOL [STEP]]")]
    Add(String),
    #[command(description = "List your alerts")]
    Alerts,
    #[command(description = "Pause an alert. Usage: /pause ID")]
    Pause(String),
    #[command(description = "Resume an alert. Usage: /resume ID")]
    Resume(String),
    #[command(description = "Change an alert's step. Usage: /step ID VALUE")]
    Step(String),
    #[command(description = "Delete an alert. Usage: /remove ID")]
    Remove(String),
    #[command(description = "List tradable tokens")]
    Tokens,
    #[command(description = "Cancel the current /add dialog")]
    Cancel,
}

/// Split `/add` arguments into optional symbol and step.
pub fn parse_add_args(args: &str) -> (Option<&str>, Option<&str>) {
    let mut parts = args.split_whitespace();
    (parts.next(), parts.next())
}

/// Parse `/step ID VALUE`.
pub fn parse_step_args(args: &str) -> Result<(AlertId, Step), AlertError> {
    let mut parts = args.split_whitespace();
    let id = parts
        .next()
        .ok_or_else(|| AlertError::InvalidAlertId(String::new()))?
        .parse()?;
    let step = parts
        .next()
        .ok_or_else(|| AlertError::InvalidNumber("missing step value".to_string()))?
        .parse()?;
    Ok((id, step))
}

fn describe_outcome(outcome: &AddOutcome) -> String {
    let alert = outcome.alert();
    let head = match outcome {
        AddOutcome::Created(_) => "✅ Alert created",
        AddOutcome::Existing(_) => "ℹ️ You already have this alert",
        AddOutcome::Reactivated(_) => "▶️ Alert re-activated",
    };
    format!("{}\n{}", head, format_alert_line(alert))
}

/// Text shown to the user for a failed operation. Backend details stay in logs.
fn user_error(err: &ServiceError) -> String {
    match err {
        ServiceError::Invalid(e) => format!("❌ {}", html::escape(&e.to_string())),
        ServiceError::UnknownSymbol(symbol) => format!(
            "❌ Token <b>{}</b> is not available on the exchange.",
            html::escape(symbol)
        ),
        ServiceError::NotFound(id) => format!("❌ Alert #{} not found.", id),
        ServiceError::Price(_) | ServiceError::Store(_) => {
            "⚠️ Something went wrong, please try again later.".to_string()
        }
    }
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    service: AlertService,
    menu: StepMenu,
    flows: DashMap<ChatId, AddAlertFlow>,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str, service: AlertService, menu: StepMenu) -> Self {
        let bot = Bot::new(token);
        Self {
            bot,
            service,
            menu,
            flows: DashMap::new(),
        }
    }

    /// Get the underlying bot for sending messages.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Run the bot update handler until Ctrl-C.
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!(error = %e, "Failed to register bot commands");
        }

        let bot = self.bot.clone();
        let commands = {
            let this = Arc::clone(&self);
            dptree::entry().filter_command::<Command>().endpoint(
                move |bot: Bot, msg: Message, cmd: Command| {
                    let this = Arc::clone(&this);
                    async move { this.handle_command(bot, msg, cmd).await }
                },
            )
        };
        let text = {
            let this = Arc::clone(&self);
            dptree::endpoint(move |bot: Bot, msg: Message| {
                let this = Arc::clone(&this);
                async move { this.handle_text(bot, msg).await }
            })
        };
        let handler = Update::filter_message().branch(commands).branch(text);

        info!("Telegram bot started");
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn reply(&self, bot: &Bot, chat: ChatId, text: String) -> Result<(), TelegramError> {
        bot.send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    /// Reply with either the success text or the user-facing error.
    async fn reply_result(
        &self,
        bot: &Bot,
        chat: ChatId,
        result: Result<String, ServiceError>,
    ) -> Result<(), TelegramError> {
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                match &e {
                    ServiceError::Price(_) | ServiceError::Store(_) => {
                        warn!(chat_id = %chat, error = %e, "Alert operation failed")
                    }
                    _ => debug!(chat_id = %chat, error = %e, "Alert operation rejected"),
                }
                user_error(&e)
            }
        };
        self.reply(bot, chat, text).await
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let chat = msg.chat.id;
        let owner = chat.to_string();
        debug!(chat_id = %chat, command = ?cmd, "Command received");

        match cmd {
            Command::Start => {
                let text = format!(
                    "👋 Welcome to the price step alert bot!\n\n\
                     Pick a token and a step in dollars. Every time the price moves \
                     by at least that step from the last alert, you get a message.\n\n{}",
                    html::escape(&Command::descriptions().to_string())
                );
                self.reply(&bot, chat, text).await?;
            }

            Command::Help => {
                self.reply(&bot, chat, html::escape(&Command::descriptions().to_string()))
                    .await?;
            }

            Command::Add(args) => match parse_add_args(&args) {
                (None, _) => {
                    self.flows.entry(chat).or_default().start();
                    self.reply(
                        &bot,
                        chat,
                        "Send the token symbol, e.g. <b>BTC</b>. /cancel to stop.".to_string(),
                    )
                    .await?;
                }
                (Some(symbol), None) => {
                    let action = self.flows.entry(chat).or_default().start_with_symbol(symbol);
                    self.act(&bot, chat, &owner, action).await?;
                }
                (Some(symbol), Some(step)) => {
                    self.flows.remove(&chat);
                    let result = match self.menu.resolve(step) {
                        Ok(step) => self
                            .service
                            .add_alert(&owner, symbol, step)
                            .await
                            .map(|o| describe_outcome(&o)),
                        Err(e) => Err(e.into()),
                    };
                    self.reply_result(&bot, chat, result).await?;
                }
            },

            Command::Alerts => {
                let result = self.service.alerts_for(&owner).await.map(|alerts| {
                    if alerts.is_empty() {
                        "You have no alerts. Use /add to create one.".to_string()
                    } else {
                        let lines: Vec<String> = alerts.iter().map(format_alert_line).collect();
                        format!("<b>Your alerts</b>\n\n{}", lines.join("\n"))
                    }
                });
                self.reply_result(&bot, chat, result).await?;
            }

            Command::Pause(args) => self.toggle(&bot, chat, &owner, &args, false).await?,

            Command::Resume(args) => self.toggle(&bot, chat, &owner, &args, true).await?,

            Command::Step(args) => {
                let result = match parse_step_args(&args) {
                    Ok((id, step)) => self
                        .service
                        .update_step(&owner, id, step)
                        .await
                        .map(|alert| {
                            format!(
                                "Step updated, tracking restarts from the current price.\n{}",
                                format_alert_line(&alert)
                            )
                        }),
                    Err(e) => Err(e.into()),
                };
                self.reply_result(&bot, chat, result).await?;
            }

            Command::Remove(args) => {
                let result = match args.parse::<AlertId>() {
                    Ok(id) => self
                        .service
                        .remove(&owner, id)
                        .await
                        .map(|alert| format!("🗑 Alert #{} ({}) removed.", alert.id, alert.symbol)),
                    Err(e) => Err(e.into()),
                };
                self.reply_result(&bot, chat, result).await?;
            }

            Command::Tokens => {
                let result = self.service.available_symbols().await.map(|symbols| {
                    let total = symbols.len();
                    let listed: Vec<String> =
                        symbols.into_iter().take(MAX_LISTED_SYMBOLS).collect();
                    let mut text = format!("<b>Available tokens ({})</b>\n\n{}", total, listed.join(", "));
                    if total > MAX_LISTED_SYMBOLS {
                        text.push_str(&format!("\n… and {} more", total - MAX_LISTED_SYMBOLS));
                    }
                    text
                });
                self.reply_result(&bot, chat, result).await?;
            }

            Command::Cancel => {
                let cancelled = self
                    .flows
                    .remove(&chat)
                    .map(|(_, mut flow)| flow.cancel())
                    .unwrap_or(false);
                let text = if cancelled {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                self.reply(&bot, chat, text.to_string()).await?;
            }
        }

        Ok(())
    }

    async fn toggle(
        &self,
        bot: &Bot,
        chat: ChatId,
        owner: &str,
        args: &str,
        active: bool,
    ) -> Result<(), TelegramError> {
        let result = match args.parse::<AlertId>() {
            Ok(id) => self.service.set_active(owner, id, active).await.map(|alert| {
                let verb = if active { "resumed" } else { "paused" };
                format!("Alert #{} {}.\n{}", alert.id, verb, format_alert_line(&alert))
            }),
            Err(e) => Err(e.into()),
        };
        self.reply_result(bot, chat, result).await
    }

    /// Plain text feeds the `/add` dialog, if one is open.
    async fn handle_text(&self, bot: Bot, msg: Message) -> Result<(), TelegramError> {
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let chat = msg.chat.id;

        let action = match self.flows.get_mut(&chat) {
            Some(mut flow) => flow.on_text(text, &self.menu),
            None => FlowAction::Ignored,
        };
        self.flows.remove_if(&chat, |_, flow| flow.is_idle());

        if action == FlowAction::Ignored {
            debug!(chat_id = %chat, "Text outside of a dialog ignored");
            return Ok(());
        }
        self.act(&bot, chat, &chat.to_string(), action).await
    }

    async fn act(
        &self,
        bot: &Bot,
        chat: ChatId,
        owner: &str,
        action: FlowAction,
    ) -> Result<(), TelegramError> {
        match action {
            FlowAction::Ignored => Ok(()),
            FlowAction::AskStep { symbol } => {
                let text = format!(
                    "Token <b>{}</b>. Choose a step by number or send any dollar amount:\n\n{}",
                    symbol, self.menu
                );
                self.reply(bot, chat, text).await
            }
            FlowAction::InvalidSymbol(symbol) => {
                let text = format!(
                    "❌ <b>{}</b> is not a valid symbol. Use 2-10 letters or digits, e.g. BTC.",
                    html::escape(&symbol)
                );
                self.reply(bot, chat, text).await
            }
            FlowAction::InvalidStep(reason) => {
                let text = format!(
                    "❌ {}\nSend a menu number or a positive amount.",
                    html::escape(&reason)
                );
                self.reply(bot, chat, text).await
            }
            FlowAction::Complete { symbol, step } => {
                let result = self
                    .service
                    .add_alert(owner, &symbol, step)
                    .await
                    .map(|o| describe_outcome(&o));
                self.reply_result(bot, chat, result).await
            }
        }
    }
}

/// Delivers fired alerts to the owner's chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, price_move: &PriceMove) -> Result<(), DeliveryError> {
        let chat_id: i64 = price_move
            .owner
            .parse()
            .map_err(|_| DeliveryError::InvalidRecipient(price_move.owner.clone()))?;

        self.bot
            .send_message(ChatId(chat_id), format_alert_message(price_move))
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| DeliveryError::Failed {
                owner: price_move.owner.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
