use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::common::config::{BotConfig, BotConfigUpdate};
use crate::common::constants::{MAX_ALERTS, MAX_TRADE_HISTORY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    pub token_name: String,
    pub token_address: String,
    /// SOL
    pub amount: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub timestamp: DateTime<Utc>,
    pub status: TradeStatus,
    pub tx_hash: Option<String>,
    pub slippage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedToken {
    pub id: u64,
    pub name: String,
    pub address: String,
    pub price: f64,
    pub change_24h: f64,
    pub liquidity: f64,
    pub market_cap: f64,
    pub holders: u64,
    pub is_eligible: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: u64,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub is_running: bool,
    pub last_activity: DateTime<Utc>,
    pub active_positions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotMetrics {
    pub total_trades: usize,
    pub successful_trades: usize,
    pub total_profit: f64,
    pub total_volume: f64,
    pub avg_profit_per_trade: f64,
    /// Percent
    pub win_rate: f64,
    pub today_trades: usize,
    pub today_profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStats {
    pub total_trades: usize,
    pub successful_trades: usize,
    pub total_profit: f64,
    pub win_rate: f64,
    pub avg_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl StatsPeriod {
    /// `1h | 24h | 7d | 30d`; anything else means the last 24 hours.
    pub fn parse(value: &str) -> Self {
        match value {
            "1h" => StatsPeriod::Hour,
            "7d" => StatsPeriod::Week,
            "30d" => StatsPeriod::Month,
            _ => StatsPeriod::Day,
        }
    }

    pub fn window(self) -> Duration {
        match self {
            StatsPeriod::Hour => Duration::hours(1),
            StatsPeriod::Day => Duration::hours(24),
            StatsPeriod::Week => Duration::days(7),
            StatsPeriod::Month => Duration::days(30),
        }
    }
}

struct Inner {
    is_running: bool,
    last_activity: DateTime<Utc>,
    trades: Vec<Trade>,
    watchlist: Vec<WatchedToken>,
    alerts: Vec<Alert>,
    config: BotConfig,
}

/// In-memory ledger of trades, alerts, watchlist and the live bot configuration.
pub struct BotState {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl BotState {
    pub fn new(config: BotConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                is_running: false,
                last_activity: Utc::now(),
                trades: Vec::new(),
                watchlist: Vec::new(),
                alerts: Vec::new(),
                config,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn status(&self) -> BotStatus {
        let inner = self.inner.read().await;
        BotStatus {
            is_running: inner.is_running,
            last_activity: inner.last_activity,
            active_positions: inner
                .trades
                .iter()
                .filter(|t| t.status == TradeStatus::Pending)
                .count(),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.is_running
    }

    pub async fn toggle(&self, running: bool) {
        let now = Utc::now();
        {
            let mut inner = self.inner.write().await;
            inner.is_running = running;
            inner.last_activity = now;
        }
        let (title, verb) = if running {
            ("Bot Started", "started")
        } else {
            ("Bot Stopped", "stopped")
        };
        self.push_alert(
            AlertKind::Info,
            title,
            format!("Trading bot has been {} at {}", verb, now.format("%H:%M:%S")),
        )
        .await;
    }

    /// Newest first; only the latest trades are kept.
    pub async fn record_trade(&self, trade: Trade) {
        let mut inner = self.inner.write().await;
        inner.last_activity = Utc::now();
        inner.trades.insert(0, trade);
        inner.trades.truncate(MAX_TRADE_HISTORY);
    }

    pub async fn recent_trades(&self, limit: usize, offset: usize) -> Vec<Trade> {
        let mut trades = self.inner.read().await.trades.clone();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn metrics(&self) -> BotMetrics {
        let inner = self.inner.read().await;
        let trades = &inner.trades;
        if trades.is_empty() {
            return BotMetrics::default();
        }

        let successful = trades.iter().filter(|t| t.status == TradeStatus::Success).count();
        let total_profit: f64 = trades.iter().map(|t| t.profit).sum();
        let total_volume: f64 = trades.iter().map(|t| t.amount).sum();
        let day_ago = Utc::now() - Duration::hours(24);
        let today: Vec<&Trade> = trades.iter().filter(|t| t.timestamp > day_ago).collect();

        BotMetrics {
            total_trades: trades.len(),
            successful_trades: successful,
            total_profit,
            total_volume,
            avg_profit_per_trade: total_profit / trades.len() as f64,
            win_rate: successful as f64 / trades.len() as f64 * 100.0,
            today_trades: today.len(),
            today_profit: today.iter().map(|t| t.profit).sum(),
        }
    }

    pub async fn trade_stats(&self, period: StatsPeriod) -> TradeStats {
        let start = Utc::now() - period.window();
        let inner = self.inner.read().await;
        let in_period: Vec<&Trade> = inner.trades.iter().filter(|t| t.timestamp >= start).collect();
        if in_period.is_empty() {
            return TradeStats::default();
        }

        let successful = in_period.iter().filter(|t| t.status == TradeStatus::Success).count();
        let total_profit: f64 = in_period.iter().map(|t| t.profit).sum();
        TradeStats {
            total_trades: in_period.len(),
            successful_trades: successful,
            total_profit,
            win_rate: successful as f64 / in_period.len() as f64 * 100.0,
            avg_profit: total_profit / in_period.len() as f64,
        }
    }

    /// Trades in the last 24 hours, counted against `max_daily_trades`.
    pub async fn trades_today(&self) -> usize {
        let day_ago = Utc::now() - Duration::hours(24);
        self.inner
            .read()
            .await
            .trades
            .iter()
            .filter(|t| t.timestamp > day_ago)
            .count()
    }

    pub async fn watchlist(&self) -> Vec<WatchedToken> {
        self.inner.read().await.watchlist.clone()
    }

    pub async fn add_to_watchlist(&self, address: &str, name: Option<String>) -> Result<WatchedToken> {
        let mut inner = self.inner.write().await;
        if inner.watchlist.iter().any(|t| t.address == address) {
            return Err(anyhow!("Token already in watchlist"));
        }
        let token = WatchedToken {
            id: self.next_id(),
            name: name.unwrap_or_else(|| "Unknown Token".to_string()),
            address: address.to_string(),
            price: 0.0,
            change_24h: 0.0,
            liquidity: 0.0,
            market_cap: 0.0,
            holders: 0,
            is_eligible: false,
            added_at: Utc::now(),
        };
        inner.watchlist.push(token.clone());
        Ok(token)
    }

    pub async fn remove_from_watchlist(&self, id: u64) {
        self.inner.write().await.watchlist.retain(|t| t.id != id);
    }

    pub async fn config(&self) -> BotConfig {
        self.inner.read().await.config.clone()
    }

    pub async fn update_config(&self, update: BotConfigUpdate) -> BotConfig {
        let config = {
            let mut inner = self.inner.write().await;
            inner.config.apply(update);
            inner.config.clone()
        };
        self.push_alert(
            AlertKind::Info,
            "Configuration Updated",
            "Bot configuration has been updated successfully".to_string(),
        )
        .await;
        config
    }

    pub async fn push_alert(&self, kind: AlertKind, title: &str, message: String) -> u64 {
        let id = self.next_id();
        let mut inner = self.inner.write().await;
        inner.alerts.insert(
            0,
            Alert {
                id,
                kind,
                title: title.to_string(),
                message,
                timestamp: Utc::now(),
                is_read: false,
            },
        );
        inner.alerts.truncate(MAX_ALERTS);
        id
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        let mut alerts = self.inner.read().await.alerts.clone();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    pub async fn mark_alert_read(&self, id: u64) {
        let mut inner = self.inner.write().await;
        if let Some(alert) = inner.alerts.iter_mut().find(|a| a.id == id) {
            alert.is_read = true;
        }
    }

    pub async fn mark_all_alerts_read(&self) {
        let mut inner = self.inner.write().await;
        for alert in inner.alerts.iter_mut() {
            alert.is_read = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(state: &BotState, age: Duration, status: TradeStatus, profit: f64) -> Trade {
        Trade {
            id: state.next_id(),
            token_name: "TEST".to_string(),
            token_address: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".to_string(),
            amount: 0.5,
            profit,
            profit_percent: profit / 0.5 * 100.0,
            timestamp: Utc::now() - age,
            status,
            tx_hash: None,
            slippage: Some(0.5),
        }
    }

    #[tokio::test]
    async fn toggle_sets_flag_and_alerts() {
        let state = BotState::new(BotConfig::default());
        assert!(!state.is_running().await);

        state.toggle(true).await;
        assert!(state.is_running().await);
        let alerts = state.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Bot Started");
        assert_eq!(alerts[0].kind, AlertKind::Info);
    }

    #[tokio::test]
    async fn trade_history_is_capped_newest_first() {
        let state = BotState::new(BotConfig::default());
        for i in 0..(MAX_TRADE_HISTORY + 5) {
            let mut t = trade(&state, Duration::seconds(0), TradeStatus::Success, 0.0);
            t.token_name = format!("T{}", i);
            state.record_trade(t).await;
        }
        let all = state.recent_trades(usize::MAX, 0).await;
        assert_eq!(all.len(), MAX_TRADE_HISTORY);
        assert!(all.iter().all(|t| t.token_name != "T0"));

        let page = state.recent_trades(2, 1).await;
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn recent_trades_are_sorted_by_time() {
        let state = BotState::new(BotConfig::default());
        state.record_trade(trade(&state, Duration::minutes(1), TradeStatus::Success, 0.0)).await;
        state.record_trade(trade(&state, Duration::minutes(10), TradeStatus::Failed, 0.0)).await;

        let trades = state.recent_trades(20, 0).await;
        assert_eq!(trades[0].status, TradeStatus::Success);
        assert_eq!(trades[1].status, TradeStatus::Failed);
    }

    #[tokio::test]
    async fn metrics_and_period_stats() {
        let state = BotState::new(BotConfig::default());
        state.record_trade(trade(&state, Duration::minutes(2), TradeStatus::Success, 1.25)).await;
        state.record_trade(trade(&state, Duration::minutes(5), TradeStatus::Failed, -0.15)).await;
        state.record_trade(trade(&state, Duration::days(3), TradeStatus::Success, 0.5)).await;

        let metrics = state.metrics().await;
        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.successful_trades, 2);
        assert!((metrics.total_profit - 1.6).abs() < 1e-9);
        assert!((metrics.total_volume - 1.5).abs() < 1e-9);
        assert!((metrics.win_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.today_trades, 2);
        assert_eq!(state.trades_today().await, 2);

        let hour = state.trade_stats(StatsPeriod::parse("1h")).await;
        assert_eq!(hour.total_trades, 2);
        assert!((hour.win_rate - 50.0).abs() < 1e-9);

        let week = state.trade_stats(StatsPeriod::parse("7d")).await;
        assert_eq!(week.total_trades, 3);

        assert_eq!(StatsPeriod::parse("bogus"), StatsPeriod::Day);
        assert_eq!(state.trade_stats(StatsPeriod::parse("bogus")).await.total_trades, 2);
    }

    #[tokio::test]
    async fn empty_state_has_zero_metrics() {
        let state = BotState::new(BotConfig::default());
        assert_eq!(state.metrics().await, BotMetrics::default());
        assert_eq!(state.trade_stats(StatsPeriod::Month).await, TradeStats::default());
        assert_eq!(state.status().await.active_positions, 0);
    }

    #[tokio::test]
    async fn watchlist_rejects_duplicates() {
        let state = BotState::new(BotConfig::default());
        let bonk = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

        let token = state.add_to_watchlist(bonk, Some("BONK".to_string())).await.unwrap();
        assert_eq!(token.name, "BONK");
        assert!(state.add_to_watchlist(bonk, None).await.is_err());

        let other = state.add_to_watchlist("So11111111111111111111111111111111111111112", None).await.unwrap();
        assert_eq!(other.name, "Unknown Token");
        assert_eq!(state.watchlist().await.len(), 2);

        state.remove_from_watchlist(token.id).await;
        let remaining = state.watchlist().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, other.id);
    }

    #[tokio::test]
    async fn config_update_is_partial_and_alerts() {
        let state = BotState::new(BotConfig::default());
        let updated = state
            .update_config(BotConfigUpdate {
                max_daily_trades: Some(3),
                ..Default::default()
            })
            .await;
        assert_eq!(updated.max_daily_trades, 3);
        assert_eq!(updated.min_liquidity, BotConfig::default().min_liquidity);
        assert_eq!(state.config().await, updated);
        assert_eq!(state.alerts().await[0].title, "Configuration Updated");
    }

    #[tokio::test]
    async fn alerts_are_capped_and_markable() {
        let state = BotState::new(BotConfig::default());
        let mut first = 0;
        for i in 0..(MAX_ALERTS + 10) {
            let id = state.push_alert(AlertKind::Warning, "w", format!("{}", i)).await;
            if i == MAX_ALERTS + 9 {
                first = id;
            }
        }
        let alerts = state.alerts().await;
        assert_eq!(alerts.len(), MAX_ALERTS);

        state.mark_alert_read(first).await;
        let alerts = state.alerts().await;
        assert!(alerts.iter().find(|a| a.id == first).unwrap().is_read);
        assert_eq!(alerts.iter().filter(|a| a.is_read).count(), 1);

        state.mark_all_alerts_read().await;
        assert!(state.alerts().await.iter().all(|a| a.is_read));
    }
}
