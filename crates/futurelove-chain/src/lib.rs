//! # FutureLove Chain
//!
//! The ledger's write and read interfaces as seen from a client.
//!
//! ## Overview
//!
//! Registration is a signed [`Transaction`] carrying a
//! [`Call::RegisterSequence`]. A node includes it in a block, executes it
//! against the [`Ledger`](futurelove_ledger::Ledger), and records a
//! [`TxReceipt`]. Clients poll for the receipt with [`wait_for_receipt`].
//!
//! ## Message Flow
//!
//! ```text
//! Client                                  Node
//!   |-------- send_transaction ----------->|  mempool
//!   |<------- tx hash ---------------------|
//!   |-------- transaction_receipt -------->|  (pending: None)
//!   |                                      |  block N: execute, receipt
//!   |-------- transaction_receipt -------->|
//!   |<------- Committed | Reverted --------|
//! ```

pub mod error;
pub mod node;
pub mod rpc;
pub mod transaction;

pub use error::{ChainError, Result};
pub use node::{LocalNode, NodeConfig};
pub use rpc::{wait_for_receipt, LedgerRpc};
pub use transaction::{Call, RevertReason, Transaction, TxHash, TxReceipt, TxStatus};
