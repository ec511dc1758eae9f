use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use crate::common::{
    config::BotConfig,
    constants::{LAMPORTS_PER_SOL, SOL_MINT},
    logger::Logger,
};
use crate::core::tx::sign_swap_transaction;
use crate::engine::bot_state::{AlertKind, BotState, Trade, TradeStatus};
use crate::engine::eligibility::{check_eligibility, EligibilityReport};
use crate::services::gmgn_api::{AggregatorApi, SwapRouteRequest};
use crate::services::monitoring::MonitoringService;
use crate::services::rpc_client::SignatureConfirmer;
use crate::services::telegram::{format_buy_alert, format_failure_alert, LimitOrderPlan, TelegramNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnipeStage {
    Validation,
    Route,
    Signing,
    Submit,
}

impl fmt::Display for SnipeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnipeStage::Validation => "validation",
            SnipeStage::Route => "route",
            SnipeStage::Signing => "signing",
            SnipeStage::Submit => "submit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SnipeOutcome {
    /// Submitted. `confirmed` is false when the RPC confirmation did not arrive in time.
    Executed { signature: String, confirmed: bool },
    Ineligible(EligibilityReport),
    Failed { stage: SnipeStage, error: String },
}

impl SnipeOutcome {
    fn failed(stage: SnipeStage, error: impl fmt::Display) -> Self {
        SnipeOutcome::Failed {
            stage,
            error: error.to_string(),
        }
    }
}

/// Buys a token through the aggregator: eligibility, route, sign, submit, confirm.
pub struct Sniper<A, C> {
    api: Arc<A>,
    confirmer: Arc<C>,
    wallet: Option<Arc<Keypair>>,
    state: Arc<BotState>,
    monitoring: Arc<MonitoringService>,
    notifier: Option<Arc<TelegramNotifier>>,
    logger: Logger,
}

impl<A: AggregatorApi, C: SignatureConfirmer> Sniper<A, C> {
    pub fn new(
        api: Arc<A>,
        confirmer: Arc<C>,
        wallet: Option<Arc<Keypair>>,
        state: Arc<BotState>,
        monitoring: Arc<MonitoringService>,
    ) -> Self {
        Self {
            api,
            confirmer,
            wallet,
            state,
            monitoring,
            notifier: None,
            logger: Logger::new("[SNIPER] => ".green().bold().to_string()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<TelegramNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> &Arc<BotState> {
        &self.state
    }

    /// `amount` (SOL) and `slippage` default to the live bot configuration.
    pub async fn snipe_token(&self, mint: &str, amount: Option<f64>, slippage: Option<f64>) -> SnipeOutcome {
        let config = self.state.config().await;
        let amount = amount.unwrap_or(config.default_amount);
        let slippage = slippage.unwrap_or(config.default_slippage);

        self.logger
            .log(format!("Sniping {} with {} SOL (slippage {})", mint, amount, slippage));
        let outcome = self.execute(mint, amount, slippage, &config).await;
        self.record(mint, amount, slippage, &outcome, &config).await;
        outcome
    }

    async fn execute(&self, mint: &str, amount: f64, slippage: f64, config: &BotConfig) -> SnipeOutcome {
        if let Err(e) = Pubkey::from_str(mint) {
            return SnipeOutcome::failed(SnipeStage::Validation, format!("Invalid token address: {}", e));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return SnipeOutcome::failed(SnipeStage::Validation, format!("Invalid amount: {}", amount));
        }
        let Some(wallet) = self.wallet.as_ref() else {
            return SnipeOutcome::failed(SnipeStage::Validation, "Wallet not configured");
        };

        let info = match self.api.token_info(mint).await {
            Ok(info) => info,
            Err(e) => {
                return SnipeOutcome::failed(SnipeStage::Validation, format!("Token info unavailable: {}", e))
            }
        };
        let report = check_eligibility(&info, config);
        if !report.eligible {
            self.logger
                .warn(format!("{} not eligible: {}", mint, report.reasons.join("; ")));
            return SnipeOutcome::Ineligible(report);
        }

        let request = SwapRouteRequest {
            token_in: SOL_MINT.to_string(),
            token_out: mint.to_string(),
            in_amount_lamports: (amount * LAMPORTS_PER_SOL).round() as u64,
            from_address: wallet.pubkey().to_string(),
            slippage,
            priority_fee: Some(config.priority_fee),
        };
        let route = match self.api.swap_route(request).await {
            Ok(route) => route,
            Err(e) => return SnipeOutcome::failed(SnipeStage::Route, format!("{:#}", e)),
        };
        let raw_tx = match (route.is_success(), route.swap_transaction()) {
            (true, Some(raw_tx)) => raw_tx,
            _ => {
                return SnipeOutcome::failed(
                    SnipeStage::Route,
                    format!(
                        "Failed to get swap route: {}",
                        route.error_message().unwrap_or("Unknown error")
                    ),
                )
            }
        };

        let signed_tx = match sign_swap_transaction(raw_tx, wallet) {
            Ok((signed_tx, _)) => signed_tx,
            Err(e) => return SnipeOutcome::failed(SnipeStage::Signing, format!("{:#}", e)),
        };

        let submitted = match self.api.submit(signed_tx, config.priority_fee).await {
            Ok(submitted) => submitted,
            Err(e) => return SnipeOutcome::failed(SnipeStage::Submit, format!("{:#}", e)),
        };
        let signature = match (submitted.is_success(), submitted.signature()) {
            (true, Some(signature)) => signature.to_string(),
            _ => {
                return SnipeOutcome::failed(
                    SnipeStage::Submit,
                    format!(
                        "Transaction submission failed: {}",
                        submitted.error_message().unwrap_or("Unknown error")
                    ),
                )
            }
        };

        let confirmed = match self.confirmer.confirm(&signature).await {
            Ok(()) => true,
            Err(e) => {
                self.logger.warn(format!("Confirmation failed for {}: {}", signature, e));
                false
            }
        };
        SnipeOutcome::Executed { signature, confirmed }
    }

    async fn record(&self, mint: &str, amount: f64, slippage: f64, outcome: &SnipeOutcome, config: &BotConfig) {
        let trade = |status: TradeStatus, tx_hash: Option<String>| Trade {
            id: self.state.next_id(),
            token_name: "Unknown Token".to_string(),
            token_address: mint.to_string(),
            amount,
            profit: 0.0,
            profit_percent: 0.0,
            timestamp: chrono::Utc::now(),
            status,
            tx_hash,
            slippage: Some(slippage),
        };

        match outcome {
            SnipeOutcome::Executed { signature, confirmed } => {
                let status = if *confirmed { TradeStatus::Success } else { TradeStatus::Pending };
                self.state.record_trade(trade(status, Some(signature.clone()))).await;
                self.state
                    .push_alert(
                        AlertKind::Success,
                        "Trade Executed",
                        format!("Bought {} for {} SOL ({})", mint, amount, signature),
                    )
                    .await;
                self.monitoring.record_metric("sniper.trade.success", amount, &[]);
                self.logger.success(format!("Snipe executed: {} ({})", mint, signature));

                if let Some(notifier) = self.notifier.as_ref() {
                    if notifier.is_configured() {
                        if let Err(e) = notifier
                            .send_alert(format_buy_alert(mint, amount, signature, *confirmed))
                            .await
                        {
                            self.logger.error(format!("{:#}", e));
                        }
                    }
                    // Orders go to the GMGN bot and need no operator chat
                    if notifier.can_place_orders() {
                        let plan = LimitOrderPlan::new(amount, config.take_profit_percent, config.stop_loss_percent);
                        if let Err(e) = notifier.place_limit_orders(mint, plan).await {
                            self.logger.error(format!("{:#}", e));
                        }
                    }
                }
            }
            SnipeOutcome::Ineligible(report) => {
                self.state
                    .push_alert(
                        AlertKind::Warning,
                        "Token Skipped",
                        format!("{} not eligible: {}", mint, report.reasons.join("; ")),
                    )
                    .await;
                self.monitoring.record_metric("sniper.trade.skipped", 1.0, &[]);
            }
            SnipeOutcome::Failed { stage, error } => {
                self.state.record_trade(trade(TradeStatus::Failed, None)).await;
                self.state
                    .push_alert(
                        AlertKind::Error,
                        "Trade Failed",
                        format!("{} failed at {}: {}", mint, stage, error),
                    )
                    .await;
                let stage_tag = stage.to_string();
                self.monitoring
                    .record_metric("sniper.trade.failure", 1.0, &[("stage", stage_tag.as_str())]);
                self.logger.error(format!("Snipe failed for {} at {}: {}", mint, stage, error));

                if let Some(notifier) = self.notifier.as_ref().filter(|n| n.is_configured()) {
                    if let Err(e) = notifier
                        .send_alert(format_failure_alert(mint, &stage_tag, error))
                        .await
                    {
                        self.logger.error(format!("{:#}", e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tx::{decode_swap_transaction, encode_transaction};
    use crate::services::gmgn_api::{
        RawTx, SubmitData, SubmitTransactionResponse, SwapRouteData, SwapRouteResponse, TokenInfo,
        TokenInfoSource, TokenMetrics,
    };
    use anyhow::{anyhow, Result};
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::signature::Signature;
    use solana_sdk::system_instruction;
    use solana_sdk::transaction::VersionedTransaction;
    use std::future::Future;
    use std::sync::Mutex;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    struct FakeAggregator {
        info: TokenInfo,
        swap_tx: Option<String>,
        accept_submit: bool,
        routes: Mutex<Vec<SwapRouteRequest>>,
        submitted: Mutex<Vec<String>>,
    }

    impl FakeAggregator {
        fn new(info: TokenInfo, swap_tx: Option<String>, accept_submit: bool) -> Self {
            Self {
                info,
                swap_tx,
                accept_submit,
                routes: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    impl AggregatorApi for FakeAggregator {
        fn token_info(&self, _mint: &str) -> impl Future<Output = Result<TokenInfo>> + Send {
            let info = self.info.clone();
            async move { Ok(info) }
        }

        fn swap_route(&self, request: SwapRouteRequest) -> impl Future<Output = Result<SwapRouteResponse>> + Send {
            self.routes.lock().unwrap().push(request);
            let response = match &self.swap_tx {
                Some(tx) => SwapRouteResponse {
                    success: true,
                    data: Some(SwapRouteData {
                        raw_tx: Some(RawTx {
                            swap_transaction: Some(tx.clone()),
                            last_valid_block_height: None,
                        }),
                        quote: None,
                    }),
                    ..Default::default()
                },
                None => SwapRouteResponse {
                    message: Some("no route".to_string()),
                    ..Default::default()
                },
            };
            async move { Ok(response) }
        }

        fn submit(
            &self,
            signed_tx: String,
            _priority_fee: f64,
        ) -> impl Future<Output = Result<SubmitTransactionResponse>> + Send {
            self.submitted.lock().unwrap().push(signed_tx.clone());
            let accept = self.accept_submit;
            async move {
                if !accept {
                    return Ok(SubmitTransactionResponse {
                        message: Some("blockhash not found".to_string()),
                        ..Default::default()
                    });
                }
                let tx = decode_swap_transaction(&signed_tx)?;
                Ok(SubmitTransactionResponse {
                    success: true,
                    data: Some(SubmitData {
                        signature: Some(tx.signatures[0].to_string()),
                        hash: None,
                    }),
                    ..Default::default()
                })
            }
        }
    }

    struct FakeConfirmer {
        confirms: bool,
    }

    impl SignatureConfirmer for FakeConfirmer {
        fn confirm(&self, _signature: &str) -> impl Future<Output = Result<()>> + Send {
            let confirms = self.confirms;
            async move {
                if confirms {
                    Ok(())
                } else {
                    Err(anyhow!("not confirmed within 60s"))
                }
            }
        }
    }

    fn good_token() -> TokenInfo {
        TokenInfo {
            metrics: TokenMetrics {
                liquidity: 245.8,
                dev_wallet_percentage: 1.5,
                is_safe: true,
                ..Default::default()
            },
            source: TokenInfoSource::Endpoint("https://gmgn.ai/defi/sol/x/info".to_string()),
        }
    }

    fn unsigned_swap_for(wallet: &Keypair) -> String {
        let ix = system_instruction::transfer(&wallet.pubkey(), &Pubkey::new_unique(), 1);
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message::new(&[ix], Some(&wallet.pubkey()))),
        };
        encode_transaction(&tx).unwrap()
    }

    fn build_sniper(
        api: FakeAggregator,
        confirms: bool,
        wallet: Option<Arc<Keypair>>,
    ) -> (Sniper<FakeAggregator, FakeConfirmer>, Arc<FakeAggregator>) {
        let api = Arc::new(api);
        let sniper = Sniper::new(
            api.clone(),
            Arc::new(FakeConfirmer { confirms }),
            wallet,
            Arc::new(BotState::new(BotConfig::default())),
            Arc::new(MonitoringService::new()),
        );
        (sniper, api)
    }

    #[tokio::test]
    async fn executes_and_records_confirmed_trade() {
        let wallet = Arc::new(Keypair::new());
        let api = FakeAggregator::new(good_token(), Some(unsigned_swap_for(&wallet)), true);
        let (sniper, api) = build_sniper(api, true, Some(wallet.clone()));

        let outcome = sniper.snipe_token(BONK, Some(0.25), None).await;
        let SnipeOutcome::Executed { signature, confirmed } = outcome.clone() else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert!(confirmed);

        let routes = api.routes.lock().unwrap();
        assert_eq!(routes[0].in_amount_lamports, 250_000_000);
        assert_eq!(routes[0].token_in, SOL_MINT);
        assert_eq!(routes[0].from_address, wallet.pubkey().to_string());
        assert_eq!(routes[0].slippage, BotConfig::default().default_slippage);

        let submitted = decode_swap_transaction(&api.submitted.lock().unwrap()[0]).unwrap();
        assert!(submitted.verify_with_results()[0]);

        let trades = sniper.state().recent_trades(10, 0).await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Success);
        assert_eq!(trades[0].tx_hash.as_deref(), Some(signature.as_str()));
        assert_eq!(sniper.state().alerts().await[0].kind, AlertKind::Success);
    }

    #[tokio::test]
    async fn unconfirmed_submit_is_still_executed() {
        let wallet = Arc::new(Keypair::new());
        let api = FakeAggregator::new(good_token(), Some(unsigned_swap_for(&wallet)), true);
        let (sniper, _) = build_sniper(api, false, Some(wallet));

        let outcome = sniper.snipe_token(BONK, None, None).await;
        assert!(matches!(outcome, SnipeOutcome::Executed { confirmed: false, .. }));
        assert_eq!(sniper.state().recent_trades(1, 0).await[0].status, TradeStatus::Pending);
    }

    #[tokio::test]
    async fn ineligible_token_is_skipped_without_route() {
        let wallet = Arc::new(Keypair::new());
        let mut info = good_token();
        info.metrics.liquidity = 1.0;
        let api = FakeAggregator::new(info, Some(unsigned_swap_for(&wallet)), true);
        let (sniper, api) = build_sniper(api, true, Some(wallet));

        let outcome = sniper.snipe_token(BONK, None, None).await;
        let SnipeOutcome::Ineligible(report) = outcome.clone() else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert_eq!(report.reasons.len(), 1);
        assert!(api.routes.lock().unwrap().is_empty());
        assert!(sniper.state().recent_trades(10, 0).await.is_empty());
        assert_eq!(sniper.state().alerts().await[0].kind, AlertKind::Warning);
    }

    #[tokio::test]
    async fn placeholder_token_data_is_ineligible() {
        let wallet = Arc::new(Keypair::new());
        let api = FakeAggregator::new(TokenInfo::placeholder(), Some(unsigned_swap_for(&wallet)), true);
        let (sniper, _) = build_sniper(api, true, Some(wallet));
        assert!(matches!(
            sniper.snipe_token(BONK, None, None).await,
            SnipeOutcome::Ineligible(_)
        ));
    }

    #[tokio::test]
    async fn route_failure_is_reported() {
        let wallet = Arc::new(Keypair::new());
        let api = FakeAggregator::new(good_token(), None, true);
        let (sniper, api) = build_sniper(api, true, Some(wallet));

        match sniper.snipe_token(BONK, None, None).await {
            SnipeOutcome::Failed { stage, error } => {
                assert_eq!(stage, SnipeStage::Route);
                assert!(error.contains("no route"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(api.submitted.lock().unwrap().is_empty());
        assert_eq!(sniper.state().recent_trades(1, 0).await[0].status, TradeStatus::Failed);
    }

    #[tokio::test]
    async fn foreign_route_transaction_fails_signing() {
        let wallet = Arc::new(Keypair::new());
        let stranger = Keypair::new();
        let api = FakeAggregator::new(good_token(), Some(unsigned_swap_for(&stranger)), true);
        let (sniper, api) = build_sniper(api, true, Some(wallet));

        assert!(matches!(
            sniper.snipe_token(BONK, None, None).await,
            SnipeOutcome::Failed { stage: SnipeStage::Signing, .. }
        ));
        assert!(api.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_submit_is_reported() {
        let wallet = Arc::new(Keypair::new());
        let api = FakeAggregator::new(good_token(), Some(unsigned_swap_for(&wallet)), false);
        let (sniper, _) = build_sniper(api, true, Some(wallet));

        match sniper.snipe_token(BONK, None, None).await {
            SnipeOutcome::Failed { stage, error } => {
                assert_eq!(stage, SnipeStage::Submit);
                assert!(error.contains("blockhash not found"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn validation_failures() {
        let wallet = Arc::new(Keypair::new());
        let api = FakeAggregator::new(good_token(), None, true);
        let (sniper, api) = build_sniper(api, true, Some(wallet));
        assert!(matches!(
            sniper.snipe_token("not-a-mint", None, None).await,
            SnipeOutcome::Failed { stage: SnipeStage::Validation, .. }
        ));
        assert!(matches!(
            sniper.snipe_token(BONK, Some(0.0), None).await,
            SnipeOutcome::Failed { stage: SnipeStage::Validation, .. }
        ));
        for amount in [f64::INFINITY, f64::NAN, -1.0] {
            assert!(matches!(
                sniper.snipe_token(BONK, Some(amount), None).await,
                SnipeOutcome::Failed { stage: SnipeStage::Validation, .. }
            ));
        }
        assert!(api.routes.lock().unwrap().is_empty());

        let (walletless, _) = build_sniper(FakeAggregator::new(good_token(), None, true), true, None);
        match walletless.snipe_token(BONK, None, None).await {
            SnipeOutcome::Failed { stage, error } => {
                assert_eq!(stage, SnipeStage::Validation);
                assert_eq!(error, "Wallet not configured");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
