//! Test fixtures and helpers.
//!
//! A [`Deployment`] wires one ledger, one coprocessor and one node behind a
//! shared manual clock; clients for any number of identities hang off it.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use futurelove::chain::{LocalNode, NodeConfig};
use futurelove::core::{Clock, ContractAddress, Ed25519PublicKey, Ed25519Signature, Keypair, ManualClock};
use futurelove::fhe::{Coprocessor, X25519StaticSecret};
use futurelove::ledger::{Ledger, LedgerConfig, MemoryLedger};
use futurelove::{Client, ClientConfig, CredentialSigner, LocalSigner, SessionContext, SignerError};

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
///
/// Honors `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
            .with(tracing_subscriber::fmt::layer().with_test_writer().without_time())
            .try_init();
    });
}

/// A complete in-process deployment.
pub struct Deployment {
    pub contract: ContractAddress,
    pub clock: ManualClock,
    pub ledger: Arc<dyn Ledger>,
    pub coprocessor: Arc<Coprocessor>,
    pub node: Arc<LocalNode>,
    pub config: ClientConfig,
}

impl Deployment {
    /// Deployment over a [`MemoryLedger`]. Must be called within a tokio
    /// runtime.
    pub fn new() -> Self {
        Self::with_ledger(|config, clock| Arc::new(MemoryLedger::with_clock(config, clock)))
    }

    /// Deployment over a ledger built by `build`.
    pub fn with_ledger<F>(build: F) -> Self
    where
        F: FnOnce(LedgerConfig, Arc<dyn Clock>) -> Arc<dyn Ledger>,
    {
        init_tracing();

        let clock = ManualClock::starting_now();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let verifier = Keypair::generate();
        let contract = ContractAddress::derive(&Keypair::generate().identity(), 0);

        let ledger = build(LedgerConfig::new(contract, verifier.public_key()), shared_clock.clone());
        let coprocessor = Arc::new(
            Coprocessor::new(X25519StaticSecret::generate(), verifier, ledger.clone())
                .with_clock(shared_clock),
        );
        let node = Arc::new(LocalNode::spawn(ledger.clone(), NodeConfig::default()));

        Self {
            contract,
            clock,
            ledger,
            coprocessor,
            node,
            config: ClientConfig::local(),
        }
    }

    /// Session for `signer` sharing the deployment clock.
    pub fn session_for(&self, signer: Arc<dyn CredentialSigner>) -> SessionContext {
        SessionContext::new(signer, self.node.clone(), self.coprocessor.clone(), self.coprocessor.clone())
            .with_config(self.config.clone())
            .with_clock(Arc::new(self.clock.clone()))
    }

    pub fn session(&self, keypair: Keypair) -> SessionContext {
        self.session_for(Arc::new(LocalSigner::new(keypair)))
    }

    pub fn client(&self, keypair: Keypair) -> Client {
        Client::new(self.session(keypair))
    }

    pub fn client_for(&self, signer: Arc<dyn CredentialSigner>) -> Client {
        Client::new(self.session_for(signer))
    }
}

/// Deterministic keypairs for multi-party tests.
pub fn multi_party_keys(count: usize) -> Vec<Keypair> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[1] = 0xF1;
            Keypair::from_seed(&seed)
        })
        .collect()
}

/// A credential holder that declines every request.
#[derive(Debug)]
pub struct RefusingSigner {
    public_key: Ed25519PublicKey,
}

impl RefusingSigner {
    pub fn new(keypair: &Keypair) -> Self {
        Self {
            public_key: keypair.public_key(),
        }
    }
}

#[async_trait]
impl CredentialSigner for RefusingSigner {
    fn public_key(&self) -> Ed25519PublicKey {
        self.public_key
    }

    async fn sign(&self, _message: &[u8]) -> Result<Ed25519Signature, SignerError> {
        Err(SignerError("user rejected the request".into()))
    }
}
