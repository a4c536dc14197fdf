//! Session context.
//!
//! A session is one identity's view of a deployment: its credential signer,
//! the ledger node, the two FHE backends and a clock. Coordinators receive the
//! context explicitly instead of reading ambient globals.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use futurelove_chain::LedgerRpc;
use futurelove_core::{
    Clock, ContractAddress, Ed25519PublicKey, Ed25519Signature, Identity, Keypair, SystemClock,
};
use futurelove_fhe::{DecryptionBackend, EncryptionBackend};

use crate::config::ClientConfig;

/// A signer refused or failed to produce a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signer refused: {0}")]
pub struct SignerError(pub String);

/// Holder of the identity's signing key.
///
/// Signing may involve a human (a wallet prompt), so callers bound it with
/// a timeout.
#[async_trait]
pub trait CredentialSigner: Send + Sync {
    fn public_key(&self) -> Ed25519PublicKey;

    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature, SignerError>;

    fn identity(&self) -> Identity {
        self.public_key().identity()
    }
}

/// Signer backed by an in-memory keypair.
pub struct LocalSigner {
    keypair: Keypair,
    delay_ms: AtomicU64,
}

impl LocalSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Delay every signature, simulating a slow approval.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("identity", &self.keypair.identity())
            .finish()
    }
}

#[async_trait]
impl CredentialSigner for LocalSigner {
    fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature, SignerError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.keypair.sign(message))
    }
}

/// Everything a workflow needs, passed explicitly.
#[derive(Clone)]
pub struct SessionContext {
    pub signer: Arc<dyn CredentialSigner>,
    pub rpc: Arc<dyn LedgerRpc>,
    pub encryption: Arc<dyn EncryptionBackend>,
    pub decryption: Arc<dyn DecryptionBackend>,
    pub clock: Arc<dyn Clock>,
    pub config: ClientConfig,
}

impl SessionContext {
    pub fn new(
        signer: Arc<dyn CredentialSigner>,
        rpc: Arc<dyn LedgerRpc>,
        encryption: Arc<dyn EncryptionBackend>,
        decryption: Arc<dyn DecryptionBackend>,
    ) -> Self {
        Self {
            signer,
            rpc,
            encryption,
            decryption,
            clock: Arc::new(SystemClock),
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(&self) -> Identity {
        self.signer.identity()
    }

    /// The registry contract, as reported by the node.
    pub fn contract(&self) -> ContractAddress {
        self.rpc.contract_address()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("identity", &self.identity())
            .field("contract", &self.contract())
            .field("config", &self.config)
            .finish()
    }
}

/// Run `fut` for at most `limit`, labelling the timeout with `what`.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| format!("{} did not finish within {:?}", what, limit))
}
