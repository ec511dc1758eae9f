use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use colored::Colorize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_transaction_status::TransactionConfirmationStatus;
use tokio::time::Instant;

use crate::common::logger::Logger;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Waits for a submitted signature to land on chain.
pub trait SignatureConfirmer: Send + Sync {
    fn confirm(&self, signature: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Polls `getSignatureStatuses` on a Solana RPC node until the signature reaches
/// `confirmed`, fails on chain, or the deadline passes.
pub struct RpcConfirmer {
    rpc_client: Arc<RpcClient>,
    timeout: Duration,
    logger: Logger,
}

impl RpcConfirmer {
    pub fn new(rpc_url: &str, timeout: Duration) -> Self {
        let rpc_client = RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        Self::with_client(Arc::new(rpc_client), timeout)
    }

    pub fn with_client(rpc_client: Arc<RpcClient>, timeout: Duration) -> Self {
        Self {
            rpc_client,
            timeout,
            logger: Logger::new("[RPC] => ".cyan().to_string()),
        }
    }

    pub async fn wait_for_confirmation(&self, signature: &str) -> Result<()> {
        let signature = Signature::from_str(signature)
            .map_err(|e| anyhow!("Invalid signature {}: {}", signature, e))?;
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let lookup = tokio::time::timeout(
                remaining,
                self.rpc_client.get_signature_statuses(&[signature]),
            )
            .await
            .map_err(|_| {
                anyhow!(
                    "Transaction {} not confirmed within {}s",
                    signature,
                    self.timeout.as_secs()
                )
            })?;
            match lookup {
                Ok(response) => {
                    if let Some(Some(status)) = response.value.into_iter().next() {
                        if let Some(err) = status.err {
                            return Err(anyhow!("Transaction {} failed on chain: {}", signature, err));
                        }
                        if matches!(
                            status.confirmation_status,
                            Some(TransactionConfirmationStatus::Confirmed)
                                | Some(TransactionConfirmationStatus::Finalized)
                        ) {
                            self.logger.success(format!("Transaction {} confirmed", signature));
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    self.logger.warn(format!("Signature status lookup failed: {}", e));
                }
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(anyhow!(
                    "Transaction {} not confirmed within {}s",
                    signature,
                    self.timeout.as_secs()
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl SignatureConfirmer for RpcConfirmer {
    fn confirm(&self, signature: &str) -> impl Future<Output = Result<()>> + Send {
        self.wait_for_confirmation(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_signature_is_rejected_without_rpc_call() {
        let confirmer = RpcConfirmer::new("http://127.0.0.1:9", Duration::from_secs(1));
        let err = confirmer.confirm("definitely-not-base58!").await.unwrap_err();
        assert!(err.to_string().contains("Invalid signature"));
    }

    #[tokio::test]
    async fn unreachable_node_times_out() {
        let confirmer = RpcConfirmer::new("http://127.0.0.1:9", Duration::from_millis(600));
        let signature = Signature::default().to_string();
        let err = confirmer.confirm(&signature).await.unwrap_err();
        assert!(err.to_string().contains("not confirmed"));
    }

    #[tokio::test]
    async fn stalled_node_cannot_outlive_the_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers.
        let stall = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let confirmer = RpcConfirmer::new(&format!("http://{addr}"), Duration::from_millis(500));
        let signature = Signature::default().to_string();
        let started = std::time::Instant::now();
        let err = confirmer.confirm(&signature).await.unwrap_err();

        assert!(err.to_string().contains("not confirmed"));
        assert!(started.elapsed() < Duration::from_secs(3));
        stall.abort();
    }
}
