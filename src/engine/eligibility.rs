use serde::Serialize;

use crate::common::config::BotConfig;
use crate::services::gmgn_api::TokenInfo;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityReport {
    pub eligible: bool,
    /// SOL
    pub liquidity: f64,
    /// Percent of supply held by the deployer wallet.
    pub dev_holdings: f64,
    pub is_safe: bool,
    /// Measured values are placeholders.
    pub degraded: bool,
    pub reasons: Vec<String>,
}

/// Threshold test deciding whether a token may be bought.
pub fn check_eligibility(info: &TokenInfo, config: &BotConfig) -> EligibilityReport {
    let metrics = &info.metrics;
    let mut reasons = Vec::new();

    if info.is_degraded() {
        reasons.push("Token data unavailable (placeholder metrics)".to_string());
    }
    if metrics.liquidity < config.min_liquidity {
        reasons.push(format!(
            "Liquidity {:.2} SOL below minimum {:.2} SOL",
            metrics.liquidity, config.min_liquidity
        ));
    }
    if metrics.dev_wallet_percentage > config.max_dev_holdings {
        reasons.push(format!(
            "Dev wallet holds {:.2}% (max {:.2}%)",
            metrics.dev_wallet_percentage, config.max_dev_holdings
        ));
    }
    if config.require_safe && !metrics.is_safe {
        reasons.push("Token not marked safe".to_string());
    }

    EligibilityReport {
        eligible: reasons.is_empty(),
        liquidity: metrics.liquidity,
        dev_holdings: metrics.dev_wallet_percentage,
        is_safe: metrics.is_safe,
        degraded: info.is_degraded(),
        reasons,
    }
}
