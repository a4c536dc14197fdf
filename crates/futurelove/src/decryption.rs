//! Decryption workflow.
//!
//! ```text
//! NotRequested ──Begin──> AwaitingSignature ──Authorized──> Requesting ──Released──> Decrypted
//!       │                        │                              │
//!       └──CacheHit──> Decrypted └────────────Fail──────────────┴──> Failed
//! ```
//!
//! Eligibility is a fresh ledger read on every attempt. Decrypted values are
//! cached per handle, and signed authorizations are reused while they stay
//! valid for at least the configured margin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use futurelove_core::{AvatarSeed, CiphertextHandle, ContractAddress, Sequence};
use futurelove_fhe::{AuthorizationRequest, X25519StaticSecret};

use crate::cache::{AuthorizationStore, HeldAuthorization, ValueCache};
use crate::error::{ClientError, DecryptionFailure, Result};
use crate::session::{bounded, SessionContext};

/// Where a decryption attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionState {
    NotRequested,
    AwaitingSignature { handle: CiphertextHandle },
    Requesting { handle: CiphertextHandle },
    Decrypted { handle: CiphertextHandle, value: u64 },
    Failed(DecryptionFailure),
}

/// Inputs to the decryption state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionEvent {
    /// The identity has a handle and no cached value.
    Begin(CiphertextHandle),
    CacheHit { handle: CiphertextHandle, value: u64 },
    /// A fresh or reused authorization is in hand.
    Authorized,
    Released(u64),
    Fail(DecryptionFailure),
    Abandon,
}

impl DecryptionState {
    /// Pure transition function.
    pub fn on(&self, event: DecryptionEvent) -> Result<DecryptionState> {
        use DecryptionEvent as E;
        use DecryptionState as S;

        let next = match (self, event) {
            (state, E::Begin(handle)) if !state.is_in_flight() => S::AwaitingSignature { handle },
            (state, E::CacheHit { handle, value }) if !state.is_in_flight() => {
                S::Decrypted { handle, value }
            }
            (S::AwaitingSignature { handle }, E::Authorized) => S::Requesting { handle: *handle },
            (S::Requesting { handle }, E::Released(value)) => S::Decrypted {
                handle: *handle,
                value,
            },
            (_, E::Fail(failure)) => S::Failed(failure),
            (state, E::Abandon) if state.is_in_flight() => S::NotRequested,
            (state, event) => {
                return Err(ClientError::InvalidTransition(format!(
                    "decryption: {:?} on {:?}",
                    event, state
                )))
            }
        };
        Ok(next)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            DecryptionState::AwaitingSignature { .. } | DecryptionState::Requesting { .. }
        )
    }
}

/// A decrypted sequence and what is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedSequence {
    pub handle: CiphertextHandle,
    pub value: u64,
    pub sequence: Sequence,
    pub avatar_seed: AvatarSeed,
}

impl DecryptedSequence {
    fn new(handle: CiphertextHandle, value: u64) -> std::result::Result<Self, DecryptionFailure> {
        let sequence = Sequence::decode(value)
            .map_err(|e| DecryptionFailure::InvalidReply(e.to_string()))?;
        Ok(Self {
            handle,
            value,
            avatar_seed: sequence.avatar_seed(),
            sequence,
        })
    }
}

type SharedState = Arc<Mutex<DecryptionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, DecryptionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InFlight {
    state: SharedState,
    running: Arc<AtomicBool>,
}

impl InFlight {
    fn advance(&self, event: DecryptionEvent) -> Result<()> {
        let mut state = lock(&self.state);
        *state = state.on(event)?;
        Ok(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.is_in_flight() {
            warn!(state = ?*state, "decryption abandoned");
            *state = DecryptionState::NotRequested;
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Drives decryption of the session identity's own sequence.
pub struct DecryptionCoordinator {
    session: SessionContext,
    state: SharedState,
    running: Arc<AtomicBool>,
    values: ValueCache,
    authorizations: AuthorizationStore,
}

impl DecryptionCoordinator {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            state: Arc::new(Mutex::new(DecryptionState::NotRequested)),
            running: Arc::new(AtomicBool::new(false)),
            values: ValueCache::new(),
            authorizations: AuthorizationStore::new(),
        }
    }

    pub fn state(&self) -> DecryptionState {
        lock(&self.state).clone()
    }

    /// Number of authorizations held for reuse.
    pub fn held_authorizations(&self) -> usize {
        self.authorizations.len()
    }

    /// Decrypt the identity's registered sequence.
    pub async fn decrypt(&self) -> Result<DecryptedSequence> {
        let guard = self.begin()?;

        match self.run(&guard).await {
            Ok(decrypted) => Ok(decrypted),
            Err(ClientError::Decryption(failure)) => {
                warn!(identity = %self.session.identity(), error = %failure, "decryption failed");
                guard.advance(DecryptionEvent::Fail(failure.clone()))?;
                Err(failure.into())
            }
            Err(other) => Err(other),
        }
    }

    fn begin(&self) -> Result<InFlight> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Busy);
        }
        Ok(InFlight {
            state: self.state.clone(),
            running: self.running.clone(),
        })
    }

    async fn run(&self, guard: &InFlight) -> Result<DecryptedSequence> {
        let identity = self.session.identity();
        let contract = self.session.contract();
        let config = &self.session.config;

        let handle = self.registered_handle().await?;

        if let Some(value) = self.values.get(&handle) {
            let decrypted = DecryptedSequence::new(handle, value)?;
            guard.advance(DecryptionEvent::CacheHit { handle, value })?;
            debug!(identity = %identity, handle = %handle, "decryption served from cache");
            return Ok(decrypted);
        }

        guard.advance(DecryptionEvent::Begin(handle))?;
        let held = match self.authorizations.fresh(
            &handle,
            &contract,
            self.session.now_millis(),
            config.authorization_reuse_margin,
        ) {
            Some(held) => {
                debug!(handle = %handle, expiry = held.authorization.expiry(), "reusing authorization");
                held
            }
            None => self.authorize(handle, contract).await?,
        };
        guard.advance(DecryptionEvent::Authorized)?;

        let reply = bounded(
            config.decryption_timeout,
            "user decryption",
            self.session.decryption.user_decrypt(&held.authorization),
        )
        .await
        .map_err(DecryptionFailure::Timeout)?;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                let failure = DecryptionFailure::from(e);
                if matches!(
                    failure,
                    DecryptionFailure::Unauthorized(_) | DecryptionFailure::Expired
                ) {
                    self.authorizations.evict(&handle, &contract);
                }
                return Err(failure.into());
            }
        };

        if reply.handle != handle || reply.subject != identity {
            return Err(DecryptionFailure::InvalidReply(format!(
                "reply for {} on {}",
                reply.subject, reply.handle
            ))
            .into());
        }

        let value = reply
            .open(&held.reply_secret)
            .map_err(DecryptionFailure::from)?;
        let decrypted = DecryptedSequence::new(handle, value)?;
        self.values.insert(handle, value);
        guard.advance(DecryptionEvent::Released(value))?;

        info!(identity = %identity, handle = %handle, "sequence decrypted");
        Ok(decrypted)
    }

    /// The identity's handle from committed ledger state.
    async fn registered_handle(&self) -> Result<CiphertextHandle> {
        let identity = self.session.identity();
        let handle = bounded(
            self.session.config.request_timeout,
            "registration lookup",
            self.session.rpc.get_encrypted_sequence(&identity),
        )
        .await
        .map_err(DecryptionFailure::Timeout)?
        .map_err(DecryptionFailure::from)?;

        handle.ok_or_else(|| DecryptionFailure::NothingToDecrypt.into())
    }

    async fn authorize(
        &self,
        handle: CiphertextHandle,
        contract: ContractAddress,
    ) -> Result<HeldAuthorization> {
        let config = &self.session.config;
        let reply_secret = X25519StaticSecret::generate();
        let request = AuthorizationRequest::new(
            self.session.signer.public_key(),
            handle,
            contract,
            self.session.now_millis(),
            config.authorization_ttl,
            reply_secret.public_key(),
        );

        let signature = bounded(
            config.signature_timeout,
            "authorization signature",
            self.session.signer.sign(&request.signing_bytes()),
        )
        .await
        .map_err(DecryptionFailure::Timeout)?
        .map_err(|e| DecryptionFailure::SignatureRejected(e.0))?;

        let held = HeldAuthorization {
            authorization: request.into_authorization(signature),
            reply_secret: Arc::new(reply_secret),
        };
        self.authorizations.insert(held.clone());
        debug!(handle = %handle, expiry = request.expiry, "authorization signed");
        Ok(held)
    }
}
