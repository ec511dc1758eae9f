use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;

use crate::common::{config::GmgnConfig, constants::*, logger::Logger};
use crate::services::monitoring::MonitoringService;
use crate::services::request_queue::RequestQueue;

const REQUEST_METRIC: &str = "gmgn.api.request";
const SUCCESS_METRIC: &str = "gmgn.api.success";
const ERROR_METRIC: &str = "gmgn.api.error";
const FALLBACK_METRIC: &str = "gmgn.api.placeholder";

#[derive(Debug, Clone, PartialEq)]
pub struct SwapRouteRequest {
    pub token_in: String,
    pub token_out: String,
    pub in_amount_lamports: u64,
    pub from_address: String,
    pub slippage: f64,
    /// SOL
    pub priority_fee: Option<f64>,
}

impl SwapRouteRequest {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("token_in_address", self.token_in.clone()),
            ("token_out_address", self.token_out.clone()),
            ("in_amount", self.in_amount_lamports.to_string()),
            ("from_address", self.from_address.clone()),
            ("slippage", self.slippage.to_string()),
        ];
        if let Some(fee) = self.priority_fee {
            pairs.push(("fee", fee.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapRouteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<SwapRouteData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapRouteData {
    #[serde(default)]
    pub raw_tx: Option<RawTx>,
    #[serde(default)]
    pub quote: Option<SwapQuote>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTx {
    #[serde(rename = "swapTransaction", default)]
    pub swap_transaction: Option<String>,
    #[serde(rename = "lastValidBlockHeight", default)]
    pub last_valid_block_height: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapQuote {
    #[serde(rename = "inAmount", default, deserialize_with = "lenient_string")]
    pub in_amount: Option<String>,
    #[serde(rename = "outAmount", default, deserialize_with = "lenient_string")]
    pub out_amount: Option<String>,
    #[serde(rename = "priceImpact", alias = "priceImpactPct", default, deserialize_with = "lenient_f64")]
    pub price_impact: Option<f64>,
}

impl SwapRouteResponse {
    /// The public API reports success either as `success: true` or `code: 0`.
    pub fn is_success(&self) -> bool {
        self.success || self.code == Some(0)
    }

    pub fn swap_transaction(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .raw_tx
            .as_ref()?
            .swap_transaction
            .as_deref()
            .filter(|tx| !tx.is_empty())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.message.as_deref().or(self.msg.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitTransactionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<SubmitData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitData {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl SubmitTransactionResponse {
    pub fn is_success(&self) -> bool {
        self.success || self.code == Some(0)
    }

    pub fn signature(&self) -> Option<&str> {
        let data = self.data.as_ref()?;
        data.signature
            .as_deref()
            .or(data.hash.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.message.as_deref().or(self.msg.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    /// SOL
    pub liquidity: f64,
    pub dev_wallet_percentage: f64,
    pub market_cap: f64,
    pub holders: u64,
    pub is_safe: bool,
    pub price: f64,
    pub volume_24h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenInfoSource {
    /// Live data returned by this URL.
    Endpoint(String),
    /// Every endpoint failed; the metrics are synthetic and must not drive trades.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenInfo {
    pub metrics: TokenMetrics,
    pub source: TokenInfoSource,
}

impl TokenInfo {
    pub fn is_degraded(&self) -> bool {
        self.source == TokenInfoSource::Placeholder
    }

    pub fn placeholder() -> Self {
        let mut rng = rand::thread_rng();
        TokenInfo {
            metrics: TokenMetrics {
                liquidity: 50.0 + rng.gen::<f64>() * 200.0,
                dev_wallet_percentage: rng.gen::<f64>() * 10.0,
                market_cap: rng.gen::<f64>() * 1_000_000.0,
                holders: rng.gen_range(0..10_000),
                is_safe: rng.gen_bool(0.7),
                price: rng.gen::<f64>() * 0.001,
                volume_24h: rng.gen::<f64>() * 100_000.0,
            },
            source: TokenInfoSource::Placeholder,
        }
    }
}

const TOKEN_FIELDS: [&str; 8] = [
    "liquidity",
    "dev_wallet_percentage",
    "market_cap",
    "holders",
    "holder_count",
    "is_safe",
    "price",
    "volume_24h",
];

/// Field lookup across the top level of a body and its `data` envelope.
///
/// Each field resolves on its own: the first level holding a non-zero
/// (or `true`) value wins, so mixed shapes keep every measured value.
struct TokenFields<'a> {
    levels: Vec<&'a Map<String, Value>>,
}

impl<'a> TokenFields<'a> {
    fn new(body: &'a Value) -> Option<Self> {
        let top = body.as_object()?;
        let mut levels = vec![top];
        if let Some(data) = top.get("data").and_then(Value::as_object) {
            levels.push(data);
        }
        let known = levels
            .iter()
            .any(|level| TOKEN_FIELDS.iter().any(|key| level.contains_key(*key)));
        known.then_some(Self { levels })
    }

    fn number(&self, keys: &[&str]) -> f64 {
        self.levels
            .iter()
            .flat_map(|level| keys.iter().filter_map(move |key| level.get(*key)))
            .filter_map(value_as_f64)
            .find(|v| *v != 0.0)
            .unwrap_or(0.0)
    }

    fn flag(&self, key: &str) -> bool {
        self.levels
            .iter()
            .filter_map(|level| level.get(key))
            .any(value_as_bool)
    }
}

/// Normalize a token-info body, flat or `data`-enveloped (or a mix of both).
pub fn parse_token_info(body: &Value) -> Option<TokenMetrics> {
    let fields = TokenFields::new(body)?;
    Some(TokenMetrics {
        liquidity: fields.number(&["liquidity"]),
        dev_wallet_percentage: fields.number(&["dev_wallet_percentage"]),
        market_cap: fields.number(&["market_cap"]),
        holders: fields.number(&["holders", "holder_count"]).max(0.0) as u64,
        is_safe: fields.flag("is_safe"),
        price: fields.number(&["price"]),
        volume_24h: fields.number(&["volume_24h"]),
    })
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(value_as_f64))
}

pub fn token_info_paths(mint: &str) -> [String; 3] {
    [
        format!("/defi/sol/{}/info", mint),
        format!("/defi/sol/{}", mint),
        format!("/api/v1/token/{}", mint),
    ]
}

async fn fetch_swap_route(
    http: &Client,
    url: &str,
    request: &SwapRouteRequest,
) -> Result<SwapRouteResponse> {
    let response = http.get(url).query(&request.query_pairs()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        ));
    }
    response
        .json::<SwapRouteResponse>()
        .await
        .context("Failed to parse swap route response")
}

/// Returns whether the HTTP status was 2xx alongside the decoded body.
async fn post_transaction(
    http: &Client,
    url: &str,
    body: &Value,
) -> Result<(bool, SubmitTransactionResponse)> {
    let response = http.post(url).json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    let parsed = serde_json::from_str::<SubmitTransactionResponse>(&text).map_err(|e| {
        anyhow!(
            "HTTP {}: unreadable submit response ({}): {}",
            status.as_u16(),
            e,
            text.chars().take(200).collect::<String>()
        )
    })?;
    Ok((status.is_success(), parsed))
}

/// The aggregator operations the trade pipeline depends on.
pub trait AggregatorApi: Send + Sync {
    fn token_info(&self, mint: &str) -> impl Future<Output = Result<TokenInfo>> + Send;

    fn swap_route(
        &self,
        request: SwapRouteRequest,
    ) -> impl Future<Output = Result<SwapRouteResponse>> + Send;

    fn submit(
        &self,
        signed_tx: String,
        priority_fee: f64,
    ) -> impl Future<Output = Result<SubmitTransactionResponse>> + Send;
}

/// GMGN public API client. Every data request goes through one rate-limited queue.
#[derive(Clone)]
pub struct GmgnClient {
    http: Client,
    api_host: String,
    queue: RequestQueue,
    monitoring: Arc<MonitoringService>,
    logger: Logger,
}

impl GmgnClient {
    pub fn new(config: &GmgnConfig, monitoring: Arc<MonitoringService>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .user_agent(GMGN_USER_AGENT)
            .default_headers(headers)
            .timeout(config.http_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_host: config.api_host.trim_end_matches('/').to_string(),
            queue: RequestQueue::new(config.rate_limit_delay, config.dispatch_timeout),
            monitoring,
            logger: Logger::new("[GMGN] => ".magenta().to_string()),
        })
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Fetch a signable swap transaction.
    pub async fn get_swap_route(&self, request: SwapRouteRequest) -> Result<SwapRouteResponse> {
        let http = self.http.clone();
        let url = format!("{}{}", self.api_host, SWAP_ROUTE_PATH);
        let monitoring = self.monitoring.clone();

        self.logger.debug(format!(
            "Queueing swap route: {} -> {} ({} lamports, slippage {})",
            request.token_in, request.token_out, request.in_amount_lamports, request.slippage
        ));

        self.queue
            .enqueue_labeled("swap_route", move || async move {
                let tags = [("endpoint", "swap_route")];
                monitoring.record_metric(REQUEST_METRIC, 1.0, &tags);

                let result = fetch_swap_route(&http, &url, &request).await;

                match &result {
                    Ok(_) => monitoring.record_metric(SUCCESS_METRIC, 1.0, &tags),
                    Err(_) => monitoring.record_metric(ERROR_METRIC, 1.0, &tags),
                }
                result
            })
            .await
    }

    /// Broadcast a signed, base64-encoded transaction.
    pub async fn submit_transaction(
        &self,
        signed_tx: String,
        priority_fee: f64,
    ) -> Result<SubmitTransactionResponse> {
        let http = self.http.clone();
        let url = format!("{}{}", self.api_host, SUBMIT_TX_PATH);
        let monitoring = self.monitoring.clone();

        self.queue
            .enqueue_labeled("submit_tx", move || async move {
                let tags = [("endpoint", "submit_tx")];
                monitoring.record_metric(REQUEST_METRIC, 1.0, &tags);

                let body = serde_json::json!({
                    "tx": signed_tx,
                    "priorityFee": priority_fee,
                });
                let result = post_transaction(&http, &url, &body).await;

                match &result {
                    Ok((true, _)) => monitoring.record_metric(SUCCESS_METRIC, 1.0, &tags),
                    _ => monitoring.record_metric(ERROR_METRIC, 1.0, &tags),
                }
                result.map(|(_, parsed)| parsed)
            })
            .await
    }

    /// Liquidity, dev holdings and safety data for a token.
    ///
    /// Tries every known endpoint and response shape; when none answers, returns
    /// placeholder metrics flagged with [`TokenInfoSource::Placeholder`].
    pub async fn get_token_info(&self, mint: &str) -> Result<TokenInfo> {
        Pubkey::from_str(mint).map_err(|e| anyhow!("Invalid token address {}: {}", mint, e))?;

        let http = self.http.clone();
        let urls: Vec<String> = token_info_paths(mint)
            .iter()
            .map(|path| format!("{}{}", self.api_host, path))
            .collect();
        let monitoring = self.monitoring.clone();
        let logger = self.logger.clone();
        let mint = mint.to_string();

        self.queue
            .enqueue_labeled("token_info", move || async move {
                let tags = [("endpoint", "token_info")];
                monitoring.record_metric(REQUEST_METRIC, 1.0, &tags);

                for url in urls {
                    let response = match http.get(&url).send().await {
                        Ok(response) => response,
                        Err(e) => {
                            logger.warn(format!("Endpoint {} failed: {}", url, e));
                            continue;
                        }
                    };
                    if !response.status().is_success() {
                        logger.warn(format!("Endpoint {} returned HTTP {}", url, response.status()));
                        continue;
                    }
                    let body = match response.json::<Value>().await {
                        Ok(body) => body,
                        Err(e) => {
                            logger.warn(format!("Endpoint {} returned invalid JSON: {}", url, e));
                            continue;
                        }
                    };
                    match parse_token_info(&body) {
                        Some(metrics) => {
                            monitoring.record_metric(SUCCESS_METRIC, 1.0, &tags);
                            return Ok(TokenInfo {
                                metrics,
                                source: TokenInfoSource::Endpoint(url),
                            });
                        }
                        None => {
                            logger.warn(format!("Endpoint {} returned an unrecognized shape", url));
                        }
                    }
                }

                logger.warn(format!(
                    "All GMGN endpoints failed for token {}, using placeholder data",
                    mint
                ));
                monitoring.record_metric(ERROR_METRIC, 1.0, &tags);
                monitoring.record_metric(FALLBACK_METRIC, 1.0, &tags);
                Ok(TokenInfo::placeholder())
            })
            .await
    }

    /// Reachability check; bypasses the queue.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}{}", self.api_host, HEALTH_PATH);
        match self.http.head(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                self.logger.error(format!("GMGN health check failed: {}", e));
                false
            }
        }
    }
}

impl AggregatorApi for GmgnClient {
    fn token_info(&self, mint: &str) -> impl Future<Output = Result<TokenInfo>> + Send {
        self.get_token_info(mint)
    }

    fn swap_route(
        &self,
        request: SwapRouteRequest,
    ) -> impl Future<Output = Result<SwapRouteResponse>> + Send {
        self.get_swap_route(request)
    }

    fn submit(
        &self,
        signed_tx: String,
        priority_fee: f64,
    ) -> impl Future<Output = Result<SubmitTransactionResponse>> + Send {
        self.submit_transaction(signed_tx, priority_fee)
    }
}
