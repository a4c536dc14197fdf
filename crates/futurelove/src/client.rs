//! The per-identity client.

use std::sync::Arc;

use futurelove_chain::ChainError;
use futurelove_core::{AvatarSeed, Category, CiphertextHandle, ContractAddress, Identity, Sequence};

use crate::cache::StatusCache;
use crate::decryption::{DecryptedSequence, DecryptionCoordinator, DecryptionState};
use crate::error::Result;
use crate::registration::{RegistrationOutcome, RegistrationState, RegistrationWorkflow};
use crate::session::{bounded, SessionContext};

/// One identity's session against a FutureLove deployment.
///
/// Several clients may exist for the same identity (several devices or
/// tabs); each keeps its own caches and state machines.
pub struct Client {
    session: SessionContext,
    status: Arc<StatusCache>,
    registration: RegistrationWorkflow,
    decryption: DecryptionCoordinator,
}

impl Client {
    pub fn new(session: SessionContext) -> Self {
        let status = Arc::new(StatusCache::new());
        Self {
            registration: RegistrationWorkflow::new(session.clone(), status.clone()),
            decryption: DecryptionCoordinator::new(session.clone()),
            status,
            session,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn identity(&self) -> Identity {
        self.session.identity()
    }

    pub fn contract(&self) -> ContractAddress {
        self.session.contract()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register an explicit value.
    pub async fn register_sequence(&self, value: u64) -> Result<RegistrationOutcome> {
        self.registration.register(value).await
    }

    /// Draw a fresh sequence for `category` and register it.
    pub async fn register_random(&self, category: Category) -> Result<(Sequence, RegistrationOutcome)> {
        let sequence = Sequence::generate(category, &mut rand::thread_rng());
        let outcome = self.registration.register(sequence.value()).await?;
        Ok((sequence, outcome))
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.registration.state()
    }

    /// Registration status, served from the session cache when known.
    ///
    /// The cache can be stale; use [`Client::refresh_registration`] for a
    /// ledger read.
    pub async fn is_registered(&self) -> Result<bool> {
        match self.status.get() {
            Some(registered) => Ok(registered),
            None => self.refresh_registration().await,
        }
    }

    /// Read registration status from the ledger and update the cache.
    pub async fn refresh_registration(&self) -> Result<bool> {
        let identity = self.identity();
        let registered = bounded(
            self.session.config.request_timeout,
            "status read",
            self.session.rpc.is_registered(&identity),
        )
        .await
        .map_err(ChainError::Timeout)??;
        self.status.set(registered);
        Ok(registered)
    }

    /// The cached status without any ledger read.
    pub fn cached_registration(&self) -> Option<bool> {
        self.status.get()
    }

    /// The identity's stored handle from committed state.
    pub async fn encrypted_sequence(&self) -> Result<Option<CiphertextHandle>> {
        let identity = self.identity();
        let handle = bounded(
            self.session.config.request_timeout,
            "handle read",
            self.session.rpc.get_encrypted_sequence(&identity),
        )
        .await
        .map_err(ChainError::Timeout)??;
        Ok(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decryption
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn decrypt_sequence(&self) -> Result<DecryptedSequence> {
        self.decryption.decrypt().await
    }

    /// Decrypt and derive the avatar seed.
    pub async fn avatar_seed(&self) -> Result<AvatarSeed> {
        Ok(self.decryption.decrypt().await?.avatar_seed)
    }

    pub fn decryption_state(&self) -> DecryptionState {
        self.decryption.state()
    }

    /// Number of signed authorizations held for reuse.
    pub fn held_authorizations(&self) -> usize {
        self.decryption.held_authorizations()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("identity", &self.identity())
            .field("registration", &self.registration_state())
            .field("decryption", &self.decryption_state())
            .finish()
    }
}
