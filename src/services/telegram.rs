use std::time::Duration;

use anyhow::{anyhow, Result};
use colored::Colorize;
use teloxide::prelude::*;
use teloxide::types::Recipient;

use crate::common::{config::TelegramConfig, constants::LIMIT_ORDER_EXPIRY_SECS, logger::Logger};

const MAX_SEND_ATTEMPTS: u32 = 3;

/// Prices for the take-profit / stop-loss pair placed after a buy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitOrderPlan {
    pub take_profit: f64,
    pub stop_loss: f64,
}

impl LimitOrderPlan {
    pub fn new(amount: f64, take_profit_percent: f64, stop_loss_percent: f64) -> Self {
        Self {
            take_profit: amount * (take_profit_percent / 100.0),
            stop_loss: amount * (1.0 - stop_loss_percent / 100.0),
        }
    }
}

/// Command understood by the GMGN trading bot.
pub fn limit_sell_command(mint: &str, price: f64, expiry_secs: u64) -> String {
    format!("/create limitsell {} {} -exp {}", mint, price, expiry_secs)
}

pub fn format_buy_alert(mint: &str, amount: f64, signature: &str, confirmed: bool) -> String {
    let status = if confirmed { "confirmed" } else { "unconfirmed" };
    format!(
        "🟢 BUY ORDER EXECUTED\n\n🪙 Mint: {}\n💵 Spent: {:.6} SOL\n📡 Status: {}\n🔗 Tx: {}",
        mint, amount, status, signature
    )
}

pub fn format_failure_alert(mint: &str, stage: &str, error: &str) -> String {
    format!(
        "🔴 SNIPE FAILED\n\n🪙 Mint: {}\n⚙️ Stage: {}\n📝 Error: {}",
        mint, stage, error
    )
}

/// Sends alerts to the operator chat and limit orders to the GMGN bot.
pub struct TelegramNotifier {
    bot: Option<Bot>,
    chat_id: Option<i64>,
    order_bot: String,
    logger: Logger,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: config.bot_token.as_ref().map(Bot::new),
            chat_id: config.chat_id,
            order_bot: config.order_bot.clone(),
            logger: Logger::new("[TELEGRAM] => ".blue().to_string()),
        }
    }

    /// Operator alerts need both the bot token and a chat id.
    pub fn is_configured(&self) -> bool {
        self.bot.is_some() && self.chat_id.is_some()
    }

    pub fn can_place_orders(&self) -> bool {
        self.bot.is_some()
    }

    /// Bot handle for the signal listener.
    pub fn bot(&self) -> Option<Bot> {
        self.bot.clone()
    }

    pub async fn send_alert(&self, text: String) -> Result<()> {
        let chat_id = self
            .chat_id
            .ok_or_else(|| anyhow!("TELEGRAM_CHAT_ID not configured"))?;
        self.send_with_retry(Recipient::Id(ChatId(chat_id)), text).await
    }

    /// Places the take-profit and stop-loss sells. Both are attempted even if the first fails.
    pub async fn place_limit_orders(&self, mint: &str, plan: LimitOrderPlan) -> Result<()> {
        let recipient = Recipient::ChannelUsername(self.order_bot.clone());
        let take_profit = self
            .send_with_retry(
                recipient.clone(),
                limit_sell_command(mint, plan.take_profit, LIMIT_ORDER_EXPIRY_SECS),
            )
            .await;
        let stop_loss = self
            .send_with_retry(
                recipient,
                limit_sell_command(mint, plan.stop_loss, LIMIT_ORDER_EXPIRY_SECS),
            )
            .await;

        match (take_profit, stop_loss) {
            (Ok(()), Ok(())) => {
                self.logger.success(format!(
                    "Limit orders placed for {} (TP {}, SL {})",
                    mint, plan.take_profit, plan.stop_loss
                ));
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => Err(e.context(format!("Limit order for {} not placed", mint))),
        }
    }

    async fn send_with_retry(&self, recipient: Recipient, text: String) -> Result<()> {
        let bot = self
            .bot
            .as_ref()
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN not configured"))?;

        let mut last_error = None;
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match bot.send_message(recipient.clone(), text.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    self.logger
                        .warn(format!("Send attempt {}/{} failed: {}", attempt, MAX_SEND_ATTEMPTS, e));
                    last_error = Some(e);
                    if attempt < MAX_SEND_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => anyhow!("Failed to send Telegram message: {}", e),
            None => anyhow!("All retry attempts failed"),
        })
    }
}
