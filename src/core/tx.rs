use anyhow::{anyhow, Context, Result};
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;

/// Decode the base64 `swapTransaction` returned by the aggregator.
pub fn decode_swap_transaction(encoded: &str) -> Result<VersionedTransaction> {
    let bytes = base64::decode(encoded.trim()).context("Swap transaction is not valid base64")?;
    bincode::deserialize::<VersionedTransaction>(&bytes)
        .context("Swap transaction is not a valid Solana transaction")
}

/// Sign `tx` in place with `keypair`, returning the new signature.
///
/// The signature lands at the slot matching the wallet's position in the static
/// account keys. Other signature slots are left untouched.
pub fn sign_transaction(tx: &mut VersionedTransaction, keypair: &Keypair) -> Result<Signature> {
    let wallet = keypair.pubkey();
    let required = tx.message.header().num_required_signatures as usize;
    let index = tx
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == wallet)
        .ok_or_else(|| anyhow!("Wallet {} is not a required signer of this transaction", wallet))?;

    if tx.signatures.len() < required {
        tx.signatures.resize(required, Signature::default());
    }

    let signature = keypair.sign_message(&tx.message.serialize());
    tx.signatures[index] = signature;
    Ok(signature)
}

pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String> {
    let bytes = bincode::serialize(tx).context("Failed to serialize transaction")?;
    Ok(base64::encode(bytes))
}

/// Decode, sign and re-encode in one step.
pub fn sign_swap_transaction(encoded: &str, keypair: &Keypair) -> Result<(String, Signature)> {
    let mut tx = decode_swap_transaction(encoded)?;
    let signature = sign_transaction(&mut tx, keypair)?;
    Ok((encode_transaction(&tx)?, signature))
}
