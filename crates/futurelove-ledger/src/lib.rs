//! # FutureLove Ledger
//!
//! The authoritative per-identity record store. Each identity may register
//! one encrypted sequence, once. The ledger is the only place that decides
//! whether a registration happened; client-side status caches are hints.
//!
//! ## Key Types
//!
//! - [`Ledger`] - The async trait for registration and reads
//! - [`MemoryLedger`] - In-memory ledger used by the local node and tests
//! - [`SqliteLedger`] - Persistent ledger with versioned migrations
//! - [`LedgerConfig`] - Contract address, trusted verifier, field type
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futurelove_core::{ContractAddress, Keypair};
//! use futurelove_ledger::{Ledger, LedgerConfig, SqliteLedger};
//!
//! async fn example() {
//!     let verifier = Keypair::generate();
//!     let config = LedgerConfig::new(ContractAddress::from_bytes([1; 20]), verifier.public_key());
//!     let ledger = SqliteLedger::open("ledger.db", config).unwrap();
//!     let registered = ledger.is_registered(&verifier.identity()).await.unwrap();
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{EncryptedSequence, Ledger, LedgerConfig};
