//! # FutureLove
//!
//! Register a secret ten-digit sequence once per identity, stored only as
//! ciphertext, and let the owner alone decrypt it later.
//!
//! ## Overview
//!
//! - **Registration**: the value is sealed to the network key, verified into
//!   a `(handle, proof)` pair, and submitted as a signed transaction. The
//!   ledger commits at most one record per identity.
//! - **Decryption**: the owner signs a scoped, time-bounded authorization;
//!   the decryption service re-encrypts the value to a key only the owner's
//!   session holds.
//! - **Avatar seed**: the decrypted value decodes to a category flag and nine
//!   digits, rendered as `<female|male>-<9 digits>`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futurelove::{Client, LocalSigner, SessionContext};
//! use futurelove::chain::{LocalNode, NodeConfig};
//! use futurelove::core::{Category, ContractAddress, Keypair};
//! use futurelove::fhe::{Coprocessor, X25519StaticSecret};
//! use futurelove::ledger::{LedgerConfig, MemoryLedger};
//!
//! async fn example() -> futurelove::Result<()> {
//!     let verifier = Keypair::generate();
//!     let contract = ContractAddress::derive(&Keypair::generate().identity(), 0);
//!     let ledger = Arc::new(MemoryLedger::new(LedgerConfig::new(contract, verifier.public_key())));
//!     let coprocessor = Arc::new(Coprocessor::new(X25519StaticSecret::generate(), verifier, ledger.clone()));
//!     let node = Arc::new(LocalNode::spawn(ledger, NodeConfig::default()));
//!
//!     let signer = Arc::new(LocalSigner::new(Keypair::generate()));
//!     let client = Client::new(SessionContext::new(signer, node, coprocessor.clone(), coprocessor));
//!
//!     let (sequence, _) = client.register_random(Category::Female).await?;
//!     let seed = client.avatar_seed().await?;
//!     assert_eq!(seed, sequence.avatar_seed());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `futurelove::core` - Identities, handles, proofs and the sequence codec
//! - `futurelove::ledger` - The registry ledger and its backends
//! - `futurelove::chain` - Transactions, receipts and the node RPC
//! - `futurelove::fhe` - Encryption and decryption backends

pub mod cache;
pub mod client;
pub mod config;
pub mod decryption;
pub mod encryption;
pub mod error;
pub mod registration;
pub mod session;

// Re-export component crates
pub use futurelove_chain as chain;
pub use futurelove_core as core;
pub use futurelove_fhe as fhe;
pub use futurelove_ledger as ledger;

pub use client::Client;
pub use config::ClientConfig;
pub use decryption::{DecryptedSequence, DecryptionCoordinator, DecryptionEvent, DecryptionState};
pub use encryption::EncryptionCoordinator;
pub use error::{ClientError, DecryptionFailure, RegistrationFailure, Result};
pub use registration::{RegistrationEvent, RegistrationOutcome, RegistrationState, RegistrationWorkflow};
pub use session::{CredentialSigner, LocalSigner, SessionContext, SignerError};

pub use futurelove_core::{AvatarSeed, Category, CiphertextHandle, ContractAddress, Identity, Keypair, Sequence};
