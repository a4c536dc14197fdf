//! In-process node.
//!
//! A commit loop on a tokio task drains the mempool channel once per block
//! interval, executes each transaction against the ledger in order, and
//! records a receipt per transaction. Tests can cut the RPC connection or
//! stop block production to exercise timeouts and transport failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use futurelove_core::{CiphertextHandle, ContractAddress, Identity};
use futurelove_ledger::Ledger;

use crate::error::{ChainError, Result};
use crate::rpc::LedgerRpc;
use crate::transaction::{Call, RevertReason, Transaction, TxHash, TxReceipt, TxStatus};

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Time between blocks.
    pub block_interval: Duration,
    /// Maximum pending transactions.
    pub mempool_capacity: usize,
    /// Maximum transactions per block.
    pub max_block_transactions: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_millis(5),
            mempool_capacity: 1024,
            max_block_transactions: 256,
        }
    }
}

#[derive(Default)]
struct ChainState {
    block: u64,
    receipts: HashMap<TxHash, TxReceipt>,
    /// Submitted, not yet included.
    pending: HashMap<TxHash, Identity>,
    /// Included transactions per account.
    nonces: HashMap<Identity, u64>,
}

struct Shared {
    ledger: Arc<dyn Ledger>,
    state: RwLock<ChainState>,
    connected: AtomicBool,
    producing: AtomicBool,
}

impl Shared {
    async fn execute(&self, sender: &Identity, call: &Call) -> TxStatus {
        match call {
            Call::RegisterSequence { handle, proof } => {
                match self.ledger.register(sender, handle, proof).await {
                    Ok(_) => TxStatus::Committed,
                    Err(e) => TxStatus::Reverted(RevertReason::from(&e)),
                }
            }
        }
    }

    async fn produce_block(&self, batch: Vec<Transaction>) {
        let mut state = self.state.write().await;
        state.block += 1;
        let block = state.block;

        for tx in batch {
            let hash = tx.hash();
            let sender = tx.sender();
            state.pending.remove(&hash);

            let expected = state.nonces.get(&sender).copied().unwrap_or(0);
            let status = if tx.nonce != expected {
                TxStatus::Reverted(RevertReason::NonceMismatch {
                    expected,
                    got: tx.nonce,
                })
            } else {
                state.nonces.insert(sender, expected + 1);
                self.execute(&sender, &tx.call).await
            };

            match &status {
                TxStatus::Committed => info!(block, tx = %hash, sender = %sender, "transaction committed"),
                TxStatus::Reverted(reason) => {
                    warn!(block, tx = %hash, sender = %sender, reason = %reason, "transaction reverted")
                }
            }

            state.receipts.insert(
                hash,
                TxReceipt {
                    tx_hash: hash,
                    sender,
                    block,
                    status,
                },
            );
        }
    }
}

async fn commit_loop(shared: Arc<Shared>, mut mempool: mpsc::Receiver<Transaction>, config: NodeConfig) {
    let mut ticker = tokio::time::interval(config.block_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.producing.load(Ordering::SeqCst) {
            continue;
        }

        let mut batch = Vec::new();
        let mut closed = false;
        while batch.len() < config.max_block_transactions {
            match mempool.try_recv() {
                Ok(tx) => batch.push(tx),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        if !batch.is_empty() {
            shared.produce_block(batch).await;
        }
        if closed {
            debug!("mempool closed, commit loop exiting");
            return;
        }
    }
}

/// A single-process chain node serving [`LedgerRpc`].
pub struct LocalNode {
    shared: Arc<Shared>,
    mempool: mpsc::Sender<Transaction>,
    task: JoinHandle<()>,
}

impl LocalNode {
    /// Start the commit loop. Must be called within a tokio runtime.
    pub fn spawn(ledger: Arc<dyn Ledger>, config: NodeConfig) -> Self {
        let shared = Arc::new(Shared {
            ledger,
            state: RwLock::new(ChainState::default()),
            connected: AtomicBool::new(true),
            producing: AtomicBool::new(true),
        });
        let (tx, rx) = mpsc::channel(config.mempool_capacity);
        let task = tokio::spawn(commit_loop(shared.clone(), rx, config));

        Self {
            shared,
            mempool: tx,
            task,
        }
    }

    /// The ledger this node executes against.
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.shared.ledger
    }

    /// Make every RPC call fail with [`ChainError::Disconnected`].
    pub fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.shared.connected.store(true, Ordering::SeqCst);
    }

    /// Stop producing blocks; submitted transactions stay pending.
    pub fn pause_blocks(&self) {
        self.shared.producing.store(false, Ordering::SeqCst);
    }

    pub fn resume_blocks(&self) {
        self.shared.producing.store(true, Ordering::SeqCst);
    }

    /// Number of submitted transactions not yet included.
    pub async fn pending_count(&self) -> usize {
        self.shared.state.read().await.pending.len()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.shared.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChainError::Disconnected("node unreachable".into()))
        }
    }
}

impl Drop for LocalNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl LedgerRpc for LocalNode {
    async fn send_transaction(&self, tx: Transaction) -> Result<TxHash> {
        self.ensure_connected()?;
        tx.verify()
            .map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;

        let hash = tx.hash();
        let sender = tx.sender();
        let mut state = self.shared.state.write().await;
        if state.receipts.contains_key(&hash) || state.pending.contains_key(&hash) {
            return Ok(hash);
        }

        self.mempool.try_send(tx).map_err(|e| match e {
            TrySendError::Full(_) => ChainError::MempoolFull,
            TrySendError::Closed(_) => ChainError::NodeStopped,
        })?;
        state.pending.insert(hash, sender);

        debug!(tx = %hash, sender = %sender, "transaction accepted");
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<TxReceipt>> {
        self.ensure_connected()?;
        Ok(self.shared.state.read().await.receipts.get(hash).cloned())
    }

    async fn pending_nonce(&self, account: &Identity) -> Result<u64> {
        self.ensure_connected()?;
        let state = self.shared.state.read().await;
        let included = state.nonces.get(account).copied().unwrap_or(0);
        let pending = state.pending.values().filter(|s| *s == account).count() as u64;
        Ok(included + pending)
    }

    async fn is_registered(&self, identity: &Identity) -> Result<bool> {
        self.ensure_connected()?;
        Ok(self.shared.ledger.is_registered(identity).await?)
    }

    async fn get_encrypted_sequence(&self, identity: &Identity) -> Result<Option<CiphertextHandle>> {
        self.ensure_connected()?;
        Ok(self.shared.ledger.get_handle(identity).await?)
    }

    async fn block_number(&self) -> Result<u64> {
        self.ensure_connected()?;
        Ok(self.shared.state.read().await.block)
    }

    fn contract_address(&self) -> ContractAddress {
        self.shared.ledger.contract_address()
    }
}
