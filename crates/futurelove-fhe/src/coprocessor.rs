//! In-process coprocessor: input verifier plus user-decrypt service.
//!
//! Holds the network X25519 secret, the verifier signing key and a vault of
//! stored ciphertexts keyed by handle. Decryption consults the ledger's ACL,
//! so the coprocessor never releases a value to an identity the ledger has
//! not granted. Verified inputs that never land on the ledger are pruned
//! after `pending_input_ttl`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use futurelove_core::{
    CiphertextHandle, Clock, ContractAddress, Ed25519PublicKey, FheType, Identity, InputProof,
    Keypair, SystemClock,
};
use futurelove_ledger::Ledger;

use crate::authorization::{duration_millis, DecryptionAuthorization};
use crate::backend::{reply_context, DecryptionBackend, EncryptionBackend, SealedReply};
use crate::crypto::{X25519PublicKey, X25519StaticSecret};
use crate::envelope::{decode_plaintext, encode_plaintext, SealedBox};
use crate::error::{FheError, Result};
use crate::input::{input_context, SealedInput, VerifiedInput};

/// Coprocessor configuration.
#[derive(Debug, Clone)]
pub struct CoprocessorConfig {
    /// Longest validity window accepted on an authorization.
    pub max_authorization_ttl: Duration,
    /// How far ahead of the service clock an authorization may be issued.
    pub max_clock_skew: Duration,
    /// Verified inputs not anchored on the ledger within this window are
    /// dropped from the vault.
    pub pending_input_ttl: Duration,
}

impl Default for CoprocessorConfig {
    fn default() -> Self {
        Self {
            max_authorization_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            max_clock_skew: Duration::from_secs(60),
            pending_input_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Clone)]
struct StoredCiphertext {
    contract: ContractAddress,
    owner: Identity,
    width: FheType,
    /// CBOR-encoded [`SealedBox`] under the network key.
    data: Bytes,
    /// Unix ms.
    verified_at: i64,
    /// Set once the ledger is seen holding this handle for `owner`.
    anchored: bool,
}

/// Input verifier and decryption service in one process.
pub struct Coprocessor {
    config: CoprocessorConfig,
    network_secret: X25519StaticSecret,
    verifier: Keypair,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    vault: RwLock<HashMap<CiphertextHandle, StoredCiphertext>>,
    /// Artificial response delay in ms, for timeout tests.
    latency_ms: AtomicU64,
}

impl Coprocessor {
    /// Create a coprocessor attesting inputs with `verifier` and checking
    /// access against `ledger`.
    pub fn new(
        network_secret: X25519StaticSecret,
        verifier: Keypair,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            config: CoprocessorConfig::default(),
            network_secret,
            verifier,
            ledger,
            clock: Arc::new(SystemClock),
            vault: RwLock::new(HashMap::new()),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn with_config(mut self, config: CoprocessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The key the ledger must trust for input proofs.
    pub fn verifier_key(&self) -> Ed25519PublicKey {
        self.verifier.public_key()
    }

    /// Delay every backend response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of ciphertexts held.
    pub fn vault_len(&self) -> usize {
        self.vault.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Drop verified inputs that did not reach the ledger within
    /// `pending_input_ttl`. Returns how many were dropped.
    pub async fn prune_unanchored(&self) -> Result<usize> {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(duration_millis(self.config.pending_input_ttl));
        let candidates: Vec<(CiphertextHandle, Identity)> = self
            .vault
            .read()
            .map_err(|e| FheError::EncryptionError(format!("vault lock poisoned: {}", e)))?
            .iter()
            .filter(|(_, stored)| !stored.anchored && stored.verified_at <= cutoff)
            .map(|(handle, stored)| (*handle, stored.owner))
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut anchored = Vec::new();
        let mut stale = Vec::new();
        for (handle, owner) in candidates {
            if self.ledger.get_handle(&owner).await? == Some(handle) {
                anchored.push(handle);
            } else {
                stale.push(handle);
            }
        }

        let mut vault = self
            .vault
            .write()
            .map_err(|e| FheError::EncryptionError(format!("vault lock poisoned: {}", e)))?;
        for handle in &anchored {
            if let Some(stored) = vault.get_mut(handle) {
                stored.anchored = true;
            }
        }
        for handle in &stale {
            vault.remove(handle);
        }

        if !stale.is_empty() {
            debug!(dropped = stale.len(), "pruned unanchored inputs");
        }
        Ok(stale.len())
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn lookup(&self, handle: &CiphertextHandle) -> Result<StoredCiphertext> {
        let vault = self
            .vault
            .read()
            .map_err(|e| FheError::DecryptionError(format!("vault lock poisoned: {}", e)))?;
        vault
            .get(handle)
            .cloned()
            .ok_or(FheError::UnknownHandle(*handle))
    }

    fn open_stored(&self, stored: &StoredCiphertext) -> Result<u64> {
        let sealed = SealedBox::from_bytes(&stored.data)?;
        let context = input_context(&stored.contract, &stored.owner, stored.width);
        decode_plaintext(&sealed.open(&self.network_secret, &context)?)
    }

    async fn check_authorization(&self, auth: &DecryptionAuthorization) -> Result<()> {
        let subject = auth.subject();

        auth.verify()
            .map_err(|e| FheError::Unauthorized(format!("bad signature: {}", e)))?;

        if auth.contract() != self.ledger.contract_address() {
            return Err(FheError::Unauthorized(format!(
                "authorization is for contract {}",
                auth.contract()
            )));
        }

        let window = auth.request.expiry.saturating_sub(auth.request.issued_at);
        if window <= 0 || window > duration_millis(self.config.max_authorization_ttl) {
            return Err(FheError::Unauthorized(format!(
                "validity window of {}ms not accepted",
                window
            )));
        }

        // The window is only bounded if it starts near the service clock.
        let now = self.clock.now_millis();
        let horizon = now.saturating_add(duration_millis(self.config.max_clock_skew));
        if auth.request.issued_at > horizon {
            return Err(FheError::Unauthorized(format!(
                "authorization issued {}ms ahead of the service clock",
                auth.request.issued_at.saturating_sub(now)
            )));
        }

        if auth.is_expired(now) {
            return Err(FheError::Expired {
                expiry: auth.expiry(),
                now,
            });
        }

        if !self.ledger.is_allowed(&auth.handle(), &subject).await? {
            return Err(FheError::Unauthorized(format!(
                "{} is not allowed on {}",
                subject,
                auth.handle()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EncryptionBackend for Coprocessor {
    fn network_public_key(&self) -> X25519PublicKey {
        self.network_secret.public_key()
    }

    async fn verify_input(&self, input: SealedInput) -> Result<VerifiedInput> {
        self.simulate_latency().await;

        if let Err(e) = self.prune_unanchored().await {
            warn!(error = %e, "vault pruning failed");
        }

        let plaintext = input
            .sealed
            .open(&self.network_secret, &input.context())
            .map_err(|e| FheError::InvalidInput(e.to_string()))?;
        let value = decode_plaintext(&plaintext).map_err(|e| FheError::InvalidInput(e.to_string()))?;
        if !input.width.fits(value) {
            return Err(FheError::InvalidInput(format!(
                "plaintext does not fit {}",
                input.width
            )));
        }

        let data = Bytes::from(input.sealed.to_bytes()?);
        let handle = CiphertextHandle::derive(&data, &input.contract, &input.identity, input.width);
        let proof = InputProof::sign(&self.verifier, &input.contract, &input.identity, &handle);

        self.vault
            .write()
            .map_err(|e| FheError::EncryptionError(format!("vault lock poisoned: {}", e)))?
            .insert(
                handle,
                StoredCiphertext {
                    contract: input.contract,
                    owner: input.identity,
                    width: input.width,
                    data,
                    verified_at: self.clock.now_millis(),
                    anchored: false,
                },
            );

        debug!(identity = %input.identity, handle = %handle, width = %input.width, "input verified");
        Ok(VerifiedInput { handle, proof })
    }
}

#[async_trait]
impl DecryptionBackend for Coprocessor {
    async fn user_decrypt(&self, authorization: &DecryptionAuthorization) -> Result<SealedReply> {
        self.simulate_latency().await;

        if let Err(e) = self.check_authorization(authorization).await {
            warn!(subject = %authorization.subject(), handle = %authorization.handle(), error = %e, "decryption refused");
            return Err(e);
        }

        let handle = authorization.handle();
        let stored = self.lookup(&handle)?;
        let value = self.open_stored(&stored)?;

        let subject = authorization.subject();
        let sealed = SealedBox::seal(
            &authorization.request.reply_key,
            &encode_plaintext(value),
            &reply_context(&handle, &subject),
        )?;

        debug!(subject = %subject, handle = %handle, "decryption released");
        Ok(SealedReply {
            handle,
            subject,
            sealed,
        })
    }
}
