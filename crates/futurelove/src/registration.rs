//! Registration workflow.
//!
//! ```text
//! Idle ──Start──> Encrypting ──Encrypted──> Submitting ──Submitted──> Confirming ──Confirmed──> Done
//!                     │                         │                        │
//!                     └───────────Fail──────────┴──────────Fail──────────┴──> Failed
//! ```
//!
//! `Done` and `Failed` accept `Start` again; whether a second registration
//! can succeed is decided by the ledger, not by this state machine. An
//! abandoned attempt (the future dropped mid-flight) returns to `Idle`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use futurelove_chain::{wait_for_receipt, Call, RevertReason, Transaction, TxHash, TxStatus};
use futurelove_core::{CiphertextHandle, InputProof};

use crate::cache::StatusCache;
use crate::encryption::EncryptionCoordinator;
use crate::error::{ClientError, RegistrationFailure, Result};
use crate::session::{bounded, SessionContext};

/// Where a registration attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    Encrypting,
    Submitting { handle: CiphertextHandle },
    Confirming { handle: CiphertextHandle, tx: TxHash },
    Done { handle: CiphertextHandle, tx: TxHash, block: u64 },
    Failed(RegistrationFailure),
}

/// Inputs to the registration state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    Start,
    Encrypted(CiphertextHandle),
    /// A transaction was accepted by the node. Sent again after a nonce race.
    Submitted(TxHash),
    Confirmed { block: u64 },
    Fail(RegistrationFailure),
    Abandon,
}

impl RegistrationState {
    /// Pure transition function.
    pub fn on(&self, event: RegistrationEvent) -> Result<RegistrationState> {
        use RegistrationEvent as E;
        use RegistrationState as S;

        let next = match (self, event) {
            (S::Idle | S::Done { .. } | S::Failed(_), E::Start) => S::Encrypting,
            (S::Encrypting, E::Encrypted(handle)) => S::Submitting { handle },
            (S::Submitting { handle } | S::Confirming { handle, .. }, E::Submitted(tx)) => {
                S::Confirming { handle: *handle, tx }
            }
            (S::Confirming { handle, tx }, E::Confirmed { block }) => S::Done {
                handle: *handle,
                tx: *tx,
                block,
            },
            (state, E::Fail(failure)) if state.is_in_flight() => S::Failed(failure),
            (state, E::Abandon) if state.is_in_flight() => S::Idle,
            (state, event) => {
                return Err(ClientError::InvalidTransition(format!(
                    "registration: {:?} on {:?}",
                    event, state
                )))
            }
        };
        Ok(next)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RegistrationState::Encrypting
                | RegistrationState::Submitting { .. }
                | RegistrationState::Confirming { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationState::Done { .. } | RegistrationState::Failed(_))
    }
}

/// A committed registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub handle: CiphertextHandle,
    pub tx_hash: TxHash,
    pub block: u64,
}

type SharedState = Arc<Mutex<RegistrationState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, RegistrationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks an attempt as in flight; resets to `Idle` if dropped before a
/// terminal state is reached.
struct InFlight {
    state: SharedState,
}

impl InFlight {
    fn advance(&self, event: RegistrationEvent) -> Result<()> {
        let mut state = lock(&self.state);
        *state = state.on(event)?;
        Ok(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.is_in_flight() {
            warn!(state = ?*state, "registration abandoned");
            *state = RegistrationState::Idle;
        }
    }
}

/// Drives one identity's registration.
pub struct RegistrationWorkflow {
    session: SessionContext,
    encryption: EncryptionCoordinator,
    state: SharedState,
    status: Arc<StatusCache>,
}

impl RegistrationWorkflow {
    pub fn new(session: SessionContext, status: Arc<StatusCache>) -> Self {
        let encryption =
            EncryptionCoordinator::new(session.encryption.clone(), session.config.encryption_timeout);
        Self {
            session,
            encryption,
            state: Arc::new(Mutex::new(RegistrationState::Idle)),
            status,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RegistrationState {
        lock(&self.state).clone()
    }

    /// Encrypt `value`, submit it, and wait for the ledger's verdict.
    ///
    /// Fails with [`ClientError::Busy`] while another attempt is in flight on
    /// this workflow.
    pub async fn register(&self, value: u64) -> Result<RegistrationOutcome> {
        let guard = self.begin()?;

        match self.run(&guard, value).await {
            Ok(outcome) => {
                self.refresh_status().await;
                info!(
                    identity = %self.session.identity(),
                    handle = %outcome.handle,
                    block = outcome.block,
                    "sequence registered"
                );
                Ok(outcome)
            }
            Err(ClientError::Registration(failure)) => {
                warn!(identity = %self.session.identity(), error = %failure, "registration failed");
                if failure == RegistrationFailure::AlreadyRegistered {
                    self.status.set(true);
                }
                guard.advance(RegistrationEvent::Fail(failure.clone()))?;
                Err(failure.into())
            }
            Err(other) => Err(other),
        }
    }

    fn begin(&self) -> Result<InFlight> {
        let mut state = lock(&self.state);
        if state.is_in_flight() {
            return Err(ClientError::Busy);
        }
        *state = state.on(RegistrationEvent::Start)?;
        Ok(InFlight {
            state: self.state.clone(),
        })
    }

    async fn run(&self, guard: &InFlight, value: u64) -> Result<RegistrationOutcome> {
        let identity = self.session.identity();
        let contract = self.session.contract();
        let config = &self.session.config;

        let (handle, proof) = self
            .encryption
            .encrypt(value, config.sequence_width, contract, identity)
            .await?;
        guard.advance(RegistrationEvent::Encrypted(handle))?;

        let mut nonce_retries = 0;
        loop {
            let tx = self.sign_transaction(handle, proof).await?;
            let tx_hash = bounded(
                config.request_timeout,
                "transaction submission",
                self.session.rpc.send_transaction(tx),
            )
            .await
            .map_err(RegistrationFailure::Timeout)?
            .map_err(RegistrationFailure::from)?;
            guard.advance(RegistrationEvent::Submitted(tx_hash))?;
            debug!(identity = %identity, tx = %tx_hash, nonce = tx.nonce, "registration submitted");

            let receipt = wait_for_receipt(
                self.session.rpc.as_ref(),
                &tx_hash,
                config.confirmation_timeout,
                config.poll_interval,
            )
            .await
            .map_err(RegistrationFailure::from)?;

            match receipt.status {
                TxStatus::Committed => {
                    guard.advance(RegistrationEvent::Confirmed {
                        block: receipt.block,
                    })?;
                    return Ok(RegistrationOutcome {
                        handle,
                        tx_hash,
                        block: receipt.block,
                    });
                }
                TxStatus::Reverted(RevertReason::NonceMismatch { expected, got })
                    if nonce_retries < config.max_nonce_retries =>
                {
                    nonce_retries += 1;
                    debug!(expected, got, attempt = nonce_retries, "nonce raced, resubmitting");
                }
                TxStatus::Reverted(reason) => {
                    return Err(RegistrationFailure::from(reason).into());
                }
            }
        }
    }

    async fn sign_transaction(&self, handle: CiphertextHandle, proof: InputProof) -> Result<Transaction> {
        let config = &self.session.config;
        let from = self.session.signer.public_key();
        let identity = from.identity();

        let nonce = bounded(
            config.request_timeout,
            "nonce query",
            self.session.rpc.pending_nonce(&identity),
        )
        .await
        .map_err(RegistrationFailure::Timeout)?
        .map_err(RegistrationFailure::from)?;

        let call = Call::RegisterSequence { handle, proof };
        let message = Transaction::signing_bytes(&from, nonce, &call);
        let signature = bounded(
            config.signature_timeout,
            "transaction signature",
            self.session.signer.sign(&message),
        )
        .await
        .map_err(RegistrationFailure::Timeout)?
        .map_err(|e| RegistrationFailure::SignatureRejected(e.0))?;

        Ok(Transaction::from_parts(from, nonce, call, signature))
    }

    async fn refresh_status(&self) {
        let identity = self.session.identity();
        match bounded(
            self.session.config.request_timeout,
            "status read",
            self.session.rpc.is_registered(&identity),
        )
        .await
        {
            Ok(Ok(registered)) => self.status.set(registered),
            Ok(Err(e)) => {
                debug!(error = %e, "status refresh failed");
                self.status.invalidate();
            }
            Err(e) => {
                debug!(error = %e, "status refresh failed");
                self.status.invalidate();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futurelove_core::{ContractAddress, FheType, Identity};

    fn handle() -> CiphertextHandle {
        CiphertextHandle::derive(
            b"ct",
            &ContractAddress::from_bytes([1u8; 20]),
            &Identity::from_bytes([2u8; 20]),
            FheType::Uint32,
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let tx = TxHash([9u8; 32]);
        let state = RegistrationState::Idle
            .on(RegistrationEvent::Start)
            .and_then(|s| s.on(RegistrationEvent::Encrypted(handle())))
            .and_then(|s| s.on(RegistrationEvent::Submitted(tx)))
            .and_then(|s| s.on(RegistrationEvent::Confirmed { block: 3 }))
            .unwrap();

        assert_eq!(
            state,
            RegistrationState::Done {
                handle: handle(),
                tx,
                block: 3
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_start_rejected_while_in_flight() {
        let state = RegistrationState::Encrypting;
        assert!(state.on(RegistrationEvent::Start).is_err());
        assert!(RegistrationState::Submitting { handle: handle() }
            .on(RegistrationEvent::Start)
            .is_err());
    }

    #[test]
    fn test_failure_from_any_in_flight_state() {
        let failure = RegistrationFailure::AlreadyRegistered;
        for state in [
            RegistrationState::Encrypting,
            RegistrationState::Submitting { handle: handle() },
            RegistrationState::Confirming {
                handle: handle(),
                tx: TxHash([1u8; 32]),
            },
        ] {
            assert_eq!(
                state.on(RegistrationEvent::Fail(failure.clone())).unwrap(),
                RegistrationState::Failed(failure.clone())
            );
        }
        assert!(RegistrationState::Idle
            .on(RegistrationEvent::Fail(failure))
            .is_err());
    }

    #[test]
    fn test_terminal_states_restart() {
        let failed = RegistrationState::Failed(RegistrationFailure::Timeout("x".into()));
        assert_eq!(
            failed.on(RegistrationEvent::Start).unwrap(),
            RegistrationState::Encrypting
        );
    }

    #[test]
    fn test_abandon_resets_to_idle() {
        let state = RegistrationState::Confirming {
            handle: handle(),
            tx: TxHash([1u8; 32]),
        };
        assert_eq!(
            state.on(RegistrationEvent::Abandon).unwrap(),
            RegistrationState::Idle
        );
        assert!(RegistrationState::Idle
            .on(RegistrationEvent::Abandon)
            .is_err());
    }

    #[test]
    fn test_confirm_requires_submission() {
        assert!(RegistrationState::Submitting { handle: handle() }
            .on(RegistrationEvent::Confirmed { block: 1 })
            .is_err());
    }

    fn event() -> impl proptest::strategy::Strategy<Value = RegistrationEvent> {
        use proptest::prelude::*;
        prop_oneof![
            Just(RegistrationEvent::Start),
            Just(RegistrationEvent::Encrypted(handle())),
            any::<[u8; 32]>().prop_map(|b| RegistrationEvent::Submitted(TxHash(b))),
            any::<u64>().prop_map(|block| RegistrationEvent::Confirmed { block }),
            Just(RegistrationEvent::Fail(RegistrationFailure::AlreadyRegistered)),
            Just(RegistrationEvent::Abandon),
        ]
    }

    proptest::proptest! {
        #[test]
        fn test_done_only_after_confirming(events in proptest::collection::vec(event(), 0..32)) {
            let mut state = RegistrationState::Idle;
            for event in events {
                let starting = event == RegistrationEvent::Start;
                match state.on(event) {
                    Ok(next) => {
                        if matches!(next, RegistrationState::Done { .. }) {
                            proptest::prop_assert!(matches!(state, RegistrationState::Confirming { .. }), "Done reached from non-Confirming state");
                        }
                        if starting {
                            proptest::prop_assert!(!state.is_in_flight());
                        }
                        state = next;
                    }
                    Err(_) => {
                        if starting {
                            proptest::prop_assert!(state.is_in_flight());
                        }
                    }
                }
            }
        }
    }
}
