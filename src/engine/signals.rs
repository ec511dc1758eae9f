use std::str::FromStr;

use colored::Colorize;
use solana_sdk::pubkey::Pubkey;
use teloxide::prelude::*;
use tokio::sync::mpsc;

use crate::common::logger::Logger;

const NEW_POOL_MARKER: &str = "New Pool";

/// Mint address announced by a "New Pool" message, if any.
pub fn extract_new_pool_address(text: &str) -> Option<String> {
    if !text.contains(NEW_POOL_MARKER) {
        return None;
    }
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| (32..=44).contains(&token.len()))
        .find(|token| Pubkey::from_str(token).is_ok())
        .map(str::to_string)
}

/// Listen for Telegram messages and forward announced pool mints to `sender`.
///
/// Runs until the dispatcher stops or the receiving side is dropped.
pub async fn start_telegram_monitor(bot: Bot, sender: mpsc::Sender<String>) {
    let logger = Logger::new("[SIGNALS] => ".yellow().bold().to_string());
    logger.log("Listening for New Pool signals on Telegram".to_string());

    teloxide::repl(bot, move |msg: Message| {
        let sender = sender.clone();
        let logger = logger.clone();
        async move {
            if let Some(mint) = msg.text().and_then(extract_new_pool_address) {
                logger.log(format!("New pool detected: {}", mint));
                if sender.send(mint).await.is_err() {
                    logger.warn("Signal receiver closed, dropping signal".to_string());
                }
            }
            respond(())
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mint_from_pool_announcement() {
        let text = "🚀 New Pool created!\nToken: DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263\nLP: 120 SOL";
        assert_eq!(
            extract_new_pool_address(text).as_deref(),
            Some("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263")
        );
    }

    #[test]
    fn ignores_messages_without_marker() {
        assert!(extract_new_pool_address("Token: DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263").is_none());
    }

    #[test]
    fn skips_tokens_that_are_not_pubkeys() {
        // 40 chars but contains '0', which is not base58
        let text = "New Pool 0000000000000000000000000000000000000000 then So11111111111111111111111111111111111111112";
        assert_eq!(
            extract_new_pool_address(text).as_deref(),
            Some("So11111111111111111111111111111111111111112")
        );
        assert!(extract_new_pool_address("New Pool with no address").is_none());
    }
}
