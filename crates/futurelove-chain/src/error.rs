//! Error types for the chain module.

use thiserror::Error;

use futurelove_ledger::LedgerError;

/// Errors that can occur while talking to a node.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The node is unreachable.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// No receipt within the confirmation window.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The node refused the transaction before inclusion.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The mempool has no room.
    #[error("mempool full")]
    MempoolFull,

    /// The commit loop has exited.
    #[error("node stopped")]
    NodeStopped,

    /// Ledger read failed on the node.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl ChainError {
    /// Transport-level failures that a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Disconnected(_) | ChainError::Timeout(_) | ChainError::MempoolFull
        )
    }
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
