//! # FutureLove Testkit
//!
//! Testing utilities for FutureLove.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Decrypted values with their expected avatar seeds
//! - **Generators**: Proptest strategies for sequences, categories and keys
//! - **Fixtures**: An in-process [`Deployment`] and per-identity clients
//!
//! ## Golden Vectors
//!
//! ```rust
//! use futurelove_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, seed) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, seed);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use futurelove::core::Keypair;
//! use futurelove_testkit::Deployment;
//!
//! # async fn example() {
//! let deployment = Deployment::new();
//! let alice = deployment.client(Keypair::generate());
//! alice.register_sequence(1234567890).await.unwrap();
//! assert_eq!(alice.avatar_seed().await.unwrap().as_str(), "male-234567890");
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, multi_party_keys, Deployment, RefusingSigner};
pub use vectors::{all_vectors, verify_all_vectors, AvatarVector};
