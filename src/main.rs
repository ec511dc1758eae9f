use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gmgn_sniper::{
    common::{config::Config, constants::RUN_MSG, logger::Logger},
    engine::{
        bot_state::BotState,
        eligibility::check_eligibility,
        signals::start_telegram_monitor,
        sniper::{SnipeOutcome, Sniper},
    },
    services::{
        gmgn_api::GmgnClient, monitoring::MonitoringService, rpc_client::RpcConfirmer,
        telegram::TelegramNotifier,
    },
};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(300);
const SIGNAL_BUFFER: usize = 100;

type GmgnSniper = Sniper<GmgnClient, RpcConfirmer>;

#[derive(Parser)]
#[command(name = "gmgn-sniper", version, about = "Solana token sniper on the GMGN aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for New Pool signals on Telegram and trade them
    Run,
    /// Buy a token once
    Snipe {
        mint: String,
        /// SOL to spend (defaults to DEFAULT_AMOUNT)
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        slippage: Option<f64>,
    },
    /// Show token info and whether it passes the eligibility checks
    TokenInfo { mint: String },
    /// Check that the GMGN API is reachable
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let logger = Logger::new("[MAIN] => ".white().bold().to_string());

    if let Err(e) = run_cli(cli, &logger).await {
        logger.error(format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli, logger: &Logger) -> Result<()> {
    let config = Config::from_env()?;
    let monitoring = Arc::new(MonitoringService::new());
    let client = Arc::new(GmgnClient::new(&config.gmgn, monitoring.clone())?);

    match cli.command {
        Command::Health => {
            if client.check_health().await {
                logger.success(format!("GMGN API reachable at {}", config.gmgn.api_host));
                Ok(())
            } else {
                Err(anyhow!("GMGN API unreachable at {}", config.gmgn.api_host))
            }
        }
        Command::TokenInfo { mint } => {
            let info = client.get_token_info(&mint).await?;
            let report = check_eligibility(&info, &config.bot);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "token": info,
                    "eligibility": report,
                }))?
            );
            Ok(())
        }
        Command::Snipe { mint, amount, slippage } => {
            let sniper = build_sniper(&config, client, monitoring);
            let outcome = sniper.snipe_token(&mint, amount, slippage).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            match outcome {
                SnipeOutcome::Failed { stage, error } => Err(anyhow!("Snipe failed at {}: {}", stage, error)),
                _ => Ok(()),
            }
        }
        Command::Run => {
            println!("{}", RUN_MSG);
            config.log_summary(logger);
            let notifier = Arc::new(TelegramNotifier::new(&config.telegram));
            let sniper = Arc::new(build_sniper(&config, client.clone(), monitoring.clone()));
            run_bot(sniper, notifier, client, monitoring, logger).await
        }
    }
}

fn build_sniper(config: &Config, client: Arc<GmgnClient>, monitoring: Arc<MonitoringService>) -> GmgnSniper {
    let confirmer = Arc::new(RpcConfirmer::new(&config.solana_rpc, config.confirm_timeout));
    let state = Arc::new(BotState::new(config.bot.clone()));
    let sniper = Sniper::new(client, confirmer, config.wallet.clone(), state, monitoring);

    let notifier = TelegramNotifier::new(&config.telegram);
    if notifier.can_place_orders() {
        sniper.with_notifier(Arc::new(notifier))
    } else {
        sniper
    }
}

async fn run_bot(
    sniper: Arc<GmgnSniper>,
    notifier: Arc<TelegramNotifier>,
    client: Arc<GmgnClient>,
    monitoring: Arc<MonitoringService>,
    logger: &Logger,
) -> Result<()> {
    let bot = notifier
        .bot()
        .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is required to listen for signals"))?;
    let cancel = CancellationToken::new();
    let (signal_tx, mut signal_rx) = mpsc::channel::<String>(SIGNAL_BUFFER);

    let listener = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = start_telegram_monitor(bot, signal_tx) => {}
                _ = cancel.cancelled() => {}
            }
        })
    };

    let summary = {
        let cancel = cancel.clone();
        let state = sniper.state().clone();
        tokio::spawn(async move {
            let logger = Logger::new("[SUMMARY] => ".cyan().bold().to_string());
            let mut interval = tokio::time::interval(SUMMARY_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let metrics = state.metrics().await;
                        let health = monitoring.health_status();
                        let queue = client.queue().stats();
                        logger.log(format!(
                            "Trades: {} ({} today, win rate {:.1}%) | API: {:?}, {} requests, {:.1}% errors | Queue: {} pending, {} dispatched, {} timed out",
                            metrics.total_trades,
                            metrics.today_trades,
                            metrics.win_rate,
                            health.status,
                            health.total_requests,
                            health.error_rate * 100.0,
                            client.queue().pending(),
                            queue.dispatched,
                            queue.timed_out,
                        ));
                    }
                }
            }
        })
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    sniper.state().toggle(true).await;
    logger.success("Bot started, waiting for signals".to_string());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = signal_rx.recv() => match signal {
                Some(mint) => handle_signal(&sniper, &mint, logger).await,
                None => break,
            },
        }
    }

    cancel.cancel();
    sniper.state().toggle(false).await;
    let _ = listener.await;
    let _ = summary.await;
    logger.log("Bot stopped".to_string());
    Ok(())
}

async fn handle_signal(sniper: &GmgnSniper, mint: &str, logger: &Logger) {
    let state = sniper.state();
    if !state.is_running().await {
        return;
    }
    let config = state.config().await;
    if !config.auto_trade {
        logger.log(format!("Auto-trade disabled, ignoring {}", mint));
        return;
    }
    let today = state.trades_today().await;
    if today >= config.max_daily_trades as usize {
        logger.warn(format!(
            "Daily trade limit reached ({}/{}), ignoring {}",
            today, config.max_daily_trades, mint
        ));
        return;
    }

    match sniper.snipe_token(mint, None, None).await {
        SnipeOutcome::Executed { signature, confirmed } => {
            logger.success(format!("Bought {} ({}, confirmed: {})", mint, signature, confirmed))
        }
        SnipeOutcome::Ineligible(report) => {
            logger.log(format!("Skipped {}: {}", mint, report.reasons.join("; ")))
        }
        SnipeOutcome::Failed { stage, error } => {
            logger.error(format!("Snipe of {} failed at {}: {}", mint, stage, error))
        }
    }
}
