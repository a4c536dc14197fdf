//! Ledger RPC abstraction.
//!
//! The client reaches the ledger only through [`LedgerRpc`]: a write path that
//! accepts signed transactions and hands back receipts, and a read path over
//! committed state. Implementations may be in-process or remote.

use std::time::Duration;

use async_trait::async_trait;

use futurelove_core::{CiphertextHandle, ContractAddress, Identity};

use crate::error::{ChainError, Result};
use crate::transaction::{Transaction, TxHash, TxReceipt};

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Write Path
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a signed transaction to the mempool.
    ///
    /// Resubmitting a known transaction returns its hash without effect.
    async fn send_transaction(&self, tx: Transaction) -> Result<TxHash>;

    /// Receipt for an included transaction, `None` while pending or unknown.
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<TxReceipt>>;

    /// Next nonce to use for `account`, counting pending transactions.
    async fn pending_nonce(&self, account: &Identity) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Read Path (committed state only)
    // ─────────────────────────────────────────────────────────────────────────

    async fn is_registered(&self, identity: &Identity) -> Result<bool>;

    /// The identity's stored handle, `None` when unregistered.
    async fn get_encrypted_sequence(&self, identity: &Identity) -> Result<Option<CiphertextHandle>>;

    /// Height of the last produced block.
    async fn block_number(&self) -> Result<u64>;

    fn contract_address(&self) -> ContractAddress;
}

/// Poll for a receipt until one appears or `timeout` elapses.
///
/// Transport errors while polling end the wait immediately.
pub async fn wait_for_receipt(
    rpc: &dyn LedgerRpc,
    hash: &TxHash,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<TxReceipt> {
    let poll = async {
        loop {
            if let Some(receipt) = rpc.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout(format!(
            "no receipt for {} after {:?}",
            hash, timeout
        ))),
    }
}
