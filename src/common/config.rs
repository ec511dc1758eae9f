use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::{Keypair, Signer};
use std::{fmt::Display, str::FromStr, sync::Arc, time::Duration};

use crate::common::{constants::*, logger::Logger};

/// Runtime configuration, built once in `main` and handed to each service.
pub struct Config {
    pub gmgn: GmgnConfig,
    pub solana_rpc: String,
    pub wallet: Option<Arc<Keypair>>,
    pub confirm_timeout: Duration,
    pub telegram: TelegramConfig,
    pub bot: BotConfig,
}

#[derive(Clone, Debug)]
pub struct GmgnConfig {
    pub api_host: String,
    /// Minimum gap between one queued request finishing and the next starting.
    pub rate_limit_delay: Duration,
    pub http_timeout: Duration,
    /// Upper bound on a single queued operation. `None` lets a hung call stall the queue.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for GmgnConfig {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_GMGN_API_HOST.to_string(),
            rate_limit_delay: Duration::from_millis(DEFAULT_RATE_LIMIT_DELAY_MS),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            dispatch_timeout: Some(Duration::from_millis(DEFAULT_DISPATCH_TIMEOUT_MS)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<i64>,
    /// Username of the GMGN trading bot that receives limit-order commands.
    pub order_bot: String,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

/// Trading thresholds. Mutable at runtime through `BotState::update_config`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// SOL
    pub min_liquidity: f64,
    /// Percent of supply held by the deployer wallet.
    pub max_dev_holdings: f64,
    /// SOL spent per snipe
    pub default_amount: f64,
    pub default_slippage: f64,
    /// SOL
    pub priority_fee: f64,
    pub require_safe: bool,
    pub auto_trade: bool,
    pub max_daily_trades: u32,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            min_liquidity: 100.0,
            max_dev_holdings: 5.0,
            default_amount: 0.5,
            default_slippage: 0.5,
            priority_fee: 0.002,
            require_safe: true,
            auto_trade: true,
            max_daily_trades: 20,
            stop_loss_percent: 20.0,
            take_profit_percent: 300.0,
        }
    }
}

/// Partial update for `BotConfig`; `None` fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfigUpdate {
    pub min_liquidity: Option<f64>,
    pub max_dev_holdings: Option<f64>,
    pub default_amount: Option<f64>,
    pub default_slippage: Option<f64>,
    pub priority_fee: Option<f64>,
    pub require_safe: Option<bool>,
    pub auto_trade: Option<bool>,
    pub max_daily_trades: Option<u32>,
    pub stop_loss_percent: Option<f64>,
    pub take_profit_percent: Option<f64>,
}

impl BotConfig {
    pub fn apply(&mut self, update: BotConfigUpdate) {
        if let Some(v) = update.min_liquidity {
            self.min_liquidity = v;
        }
        if let Some(v) = update.max_dev_holdings {
            self.max_dev_holdings = v;
        }
        if let Some(v) = update.default_amount {
            self.default_amount = v;
        }
        if let Some(v) = update.default_slippage {
            self.default_slippage = v;
        }
        if let Some(v) = update.priority_fee {
            self.priority_fee = v;
        }
        if let Some(v) = update.require_safe {
            self.require_safe = v;
        }
        if let Some(v) = update.auto_trade {
            self.auto_trade = v;
        }
        if let Some(v) = update.max_daily_trades {
            self.max_daily_trades = v;
        }
        if let Some(v) = update.stop_loss_percent {
            self.stop_loss_percent = v;
        }
        if let Some(v) = update.take_profit_percent {
            self.take_profit_percent = v;
        }
    }
}

impl Config {
    /// Load `.env` and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_host = string_var(&lookup, "GMGN_API_HOST", DEFAULT_GMGN_API_HOST)
            .trim_end_matches('/')
            .to_string();
        let rate_limit_delay = Duration::from_millis(parse_var(
            &lookup,
            "RATE_LIMIT_DELAY_MS",
            DEFAULT_RATE_LIMIT_DELAY_MS,
        )?);
        let http_timeout = Duration::from_millis(parse_var(
            &lookup,
            "GMGN_HTTP_TIMEOUT_MS",
            DEFAULT_HTTP_TIMEOUT_MS,
        )?);
        let dispatch_timeout_ms: u64 =
            parse_var(&lookup, "GMGN_DISPATCH_TIMEOUT_MS", DEFAULT_DISPATCH_TIMEOUT_MS)?;
        let dispatch_timeout = match dispatch_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let wallet = match lookup("WALLET_PRIVATE_KEY").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(Arc::new(import_wallet(&raw)?)),
            None => None,
        };

        let defaults = BotConfig::default();
        let bot = BotConfig {
            min_liquidity: parse_var(&lookup, "MIN_LIQUIDITY", defaults.min_liquidity)?,
            max_dev_holdings: parse_var(&lookup, "MAX_DEV_HOLDINGS", defaults.max_dev_holdings)?,
            default_amount: parse_var(&lookup, "DEFAULT_AMOUNT", defaults.default_amount)?,
            default_slippage: parse_var(&lookup, "DEFAULT_SLIPPAGE", defaults.default_slippage)?,
            priority_fee: parse_var(&lookup, "PRIORITY_FEE", defaults.priority_fee)?,
            require_safe: parse_flag(&lookup, "REQUIRE_SAFE", defaults.require_safe)?,
            auto_trade: parse_flag(&lookup, "AUTO_TRADE", defaults.auto_trade)?,
            max_daily_trades: parse_var(&lookup, "MAX_DAILY_TRADES", defaults.max_daily_trades)?,
            stop_loss_percent: parse_var(&lookup, "STOP_LOSS_PERCENT", defaults.stop_loss_percent)?,
            take_profit_percent: parse_var(
                &lookup,
                "TAKE_PROFIT_PERCENT",
                defaults.take_profit_percent,
            )?,
        };

        let chat_id = match lookup("TELEGRAM_CHAT_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<i64>()
                    .with_context(|| format!("Invalid TELEGRAM_CHAT_ID: {}", raw))?,
            ),
            None => None,
        };
        let telegram = TelegramConfig {
            bot_token: lookup("TELEGRAM_BOT_TOKEN").filter(|v| !v.trim().is_empty()),
            chat_id,
            order_bot: string_var(&lookup, "GMGN_TELEGRAM_BOT", DEFAULT_GMGN_TELEGRAM_BOT),
        };

        Ok(Config {
            gmgn: GmgnConfig {
                api_host,
                rate_limit_delay,
                http_timeout,
                dispatch_timeout,
            },
            solana_rpc: string_var(&lookup, "SOLANA_RPC", DEFAULT_SOLANA_RPC),
            wallet,
            confirm_timeout: Duration::from_secs(parse_var(
                &lookup,
                "CONFIRM_TIMEOUT_SECS",
                DEFAULT_CONFIRM_TIMEOUT_SECS,
            )?),
            telegram,
            bot,
        })
    }

    pub fn log_summary(&self, logger: &Logger) {
        let wallet = self
            .wallet
            .as_ref()
            .map(|w| w.pubkey().to_string())
            .unwrap_or_else(|| "Not configured".to_string());
        let dispatch_timeout = self
            .gmgn
            .dispatch_timeout
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "off".to_string());
        logger.log(
            format!(
                "[SNIPER ENVIRONMENT]: \n\t * [GMGN]: {}, * [RPC]: {}, \n\t * [Wallet]: {}, \n\t * [Rate limit]: {}ms, * [Dispatch timeout]: {}, \n\t * [Min liquidity]: {} SOL, * [Max dev holdings]: {}%, * [Amount]: {} SOL, * [Slippage]: {}, * [Priority fee]: {} SOL, \n\t * [Telegram]: {}",
                self.gmgn.api_host,
                self.solana_rpc,
                wallet,
                self.gmgn.rate_limit_delay.as_millis(),
                dispatch_timeout,
                self.bot.min_liquidity,
                self.bot.max_dev_holdings,
                self.bot.default_amount,
                self.bot.default_slippage,
                self.bot.priority_fee,
                if self.telegram.is_configured() { "configured" } else { "disabled" },
            )
            .purple()
            .italic()
            .to_string(),
        );
    }
}

/// Decode a base58 64-byte secret key.
pub fn import_wallet(private_key: &str) -> Result<Keypair> {
    let bytes = bs58::decode(private_key.trim())
        .into_vec()
        .map_err(|e| anyhow!("WALLET_PRIVATE_KEY is not valid base58: {}", e))?;
    if bytes.len() != 64 {
        return Err(anyhow!(
            "WALLET_PRIVATE_KEY has invalid length: {} bytes (expected 64)",
            bytes.len()
        ));
    }
    Keypair::from_bytes(&bytes).map_err(|e| anyhow!("Invalid wallet keypair: {}", e))
}

fn string_var<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", key, raw, e)),
        _ => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("Invalid value for {}: {:?} (expected true/false)", key, raw)),
        },
        _ => Ok(default),
    }
}
