//! In-memory implementation of the Ledger trait.
//!
//! Same semantics as SQLite with no persistence. Used by the local node and
//! most tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use futurelove_core::{CiphertextHandle, Clock, Identity, InputProof, SystemClock};

use crate::error::{LedgerError, Result};
use crate::traits::{EncryptedSequence, Ledger, LedgerConfig};

/// In-memory ledger implementation.
///
/// All data is lost when the ledger is dropped. Thread-safe via RwLock; the
/// whole registration runs under one write guard.
pub struct MemoryLedger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    inner: RwLock<MemoryLedgerInner>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    /// Records indexed by owner.
    records: HashMap<Identity, EncryptedSequence>,

    /// Handles already stored, for uniqueness.
    handles: HashSet<CiphertextHandle>,

    /// Access control list: handle -> accounts allowed to decrypt.
    acl: HashMap<CiphertextHandle, HashSet<Identity>>,
}

impl MemoryLedger {
    /// Create a new empty ledger.
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a ledger that timestamps records with `clock`.
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: RwLock::new(MemoryLedgerInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryLedgerInner>> {
        self.inner
            .read()
            .map_err(|e| LedgerError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryLedgerInner>> {
        self.inner
            .write()
            .map_err(|e| LedgerError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn register(
        &self,
        caller: &Identity,
        handle: &CiphertextHandle,
        proof: &InputProof,
    ) -> Result<EncryptedSequence> {
        let mut inner = self.write()?;

        if inner.records.contains_key(caller) {
            return Err(LedgerError::AlreadyRegistered(*caller));
        }

        self.config.admit(caller, handle, proof)?;

        if inner.handles.contains(handle) {
            return Err(LedgerError::DuplicateHandle(*handle));
        }

        let record = EncryptedSequence {
            owner: *caller,
            handle: *handle,
            registered_at: self.clock.now_millis(),
        };
        inner.records.insert(*caller, record);
        inner.handles.insert(*handle);
        inner.acl.entry(*handle).or_default().insert(*caller);

        debug!(owner = %caller, handle = %handle, "sequence registered");
        Ok(record)
    }

    async fn is_registered(&self, identity: &Identity) -> Result<bool> {
        Ok(self.read()?.records.contains_key(identity))
    }

    async fn get_handle(&self, identity: &Identity) -> Result<Option<CiphertextHandle>> {
        Ok(self.read()?.records.get(identity).map(|r| r.handle))
    }

    async fn get_record(&self, identity: &Identity) -> Result<Option<EncryptedSequence>> {
        Ok(self.read()?.records.get(identity).copied())
    }

    async fn is_allowed(&self, handle: &CiphertextHandle, account: &Identity) -> Result<bool> {
        Ok(self
            .read()?
            .acl
            .get(handle)
            .map(|accounts| accounts.contains(account))
            .unwrap_or(false))
    }

    async fn registration_count(&self) -> Result<u64> {
        Ok(self.read()?.records.len() as u64)
    }

    fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futurelove_core::{ContractAddress, FheType, Keypair};

    struct Setup {
        verifier: Keypair,
        config: LedgerConfig,
    }

    fn setup() -> Setup {
        let verifier = Keypair::from_seed(&[7u8; 32]);
        let contract = ContractAddress::from_bytes([1u8; 20]);
        Setup {
            config: LedgerConfig::new(contract, verifier.public_key()),
            verifier,
        }
    }

    fn make_input(s: &Setup, owner: &Identity, ct: &[u8]) -> (CiphertextHandle, InputProof) {
        let handle = CiphertextHandle::derive(ct, &s.config.contract, owner, FheType::Uint32);
        let proof = InputProof::sign(&s.verifier, &s.config.contract, owner, &handle);
        (handle, proof)
    }

    #[tokio::test]
    async fn test_register_and_read() {
        let s = setup();
        let ledger = MemoryLedger::new(s.config);
        let alice = Identity::from_bytes([0xa1; 20]);
        let (handle, proof) = make_input(&s, &alice, b"ct");

        assert!(!ledger.is_registered(&alice).await.unwrap());
        assert_eq!(ledger.get_handle(&alice).await.unwrap(), None);

        let record = ledger.register(&alice, &handle, &proof).await.unwrap();
        assert_eq!(record.owner, alice);
        assert!(ledger.is_registered(&alice).await.unwrap());
        assert_eq!(ledger.get_handle(&alice).await.unwrap(), Some(handle));
        assert!(ledger.is_allowed(&handle, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_registration_rejected() {
        let s = setup();
        let ledger = MemoryLedger::new(s.config);
        let alice = Identity::from_bytes([0xa1; 20]);
        let (h1, p1) = make_input(&s, &alice, b"first");
        let (h2, p2) = make_input(&s, &alice, b"second");

        ledger.register(&alice, &h1, &p1).await.unwrap();
        let err = ledger.register(&alice, &h2, &p2).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRegistered(id) if id == alice));

        // First record untouched.
        assert_eq!(ledger.get_handle(&alice).await.unwrap(), Some(h1));
    }

    #[tokio::test]
    async fn test_invalid_proof_creates_no_state() {
        let s = setup();
        let ledger = MemoryLedger::new(s.config);
        let alice = Identity::from_bytes([0xa1; 20]);
        let bob = Identity::from_bytes([0xb0; 20]);

        // Bob replays Alice's input.
        let (handle, proof) = make_input(&s, &alice, b"ct");
        let err = ledger.register(&bob, &handle, &proof).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof(_)));
        assert!(!ledger.is_registered(&bob).await.unwrap());

        // Budget not consumed.
        let (own_handle, own_proof) = make_input(&s, &bob, b"ct");
        ledger.register(&bob, &own_handle, &own_proof).await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_type_mismatch() {
        let s = setup();
        let ledger = MemoryLedger::new(s.config);
        let alice = Identity::from_bytes([0xa1; 20]);
        let handle = CiphertextHandle::derive(b"ct", &s.config.contract, &alice, FheType::Uint8);
        let proof = InputProof::sign(&s.verifier, &s.config.contract, &alice, &handle);

        let err = ledger.register(&alice, &handle, &proof).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::HandleTypeMismatch { expected: FheType::Uint32, .. }
        ));
    }

    #[tokio::test]
    async fn test_acl_is_per_owner() {
        let s = setup();
        let ledger = MemoryLedger::new(s.config);
        let alice = Identity::from_bytes([0xa1; 20]);
        let bob = Identity::from_bytes([0xb0; 20]);
        let (handle, proof) = make_input(&s, &alice, b"ct");
        ledger.register(&alice, &handle, &proof).await.unwrap();

        assert!(!ledger.is_allowed(&handle, &bob).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_single_winner() {
        let s = setup();
        let ledger = Arc::new(MemoryLedger::new(s.config));
        let alice = Identity::from_bytes([0xa1; 20]);

        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let ledger = ledger.clone();
            let (handle, proof) = make_input(&s, &alice, &[i]);
            tasks.push(tokio::spawn(async move {
                ledger.register(&alice, &handle, &proof).await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(LedgerError::AlreadyRegistered(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(ledger.registration_count().await.unwrap(), 1);
    }

    proptest::proptest! {
        #[test]
        fn test_first_registration_wins(owners in proptest::collection::vec(0u8..4, 1..24)) {
            let s = setup();
            let ledger = MemoryLedger::new(s.config);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let mut first = std::collections::HashMap::new();
            for (attempt, owner) in owners.iter().enumerate() {
                let identity = Identity::from_bytes([*owner; 20]);
                let (handle, proof) = make_input(&s, &identity, &attempt.to_le_bytes());
                let result = runtime.block_on(ledger.register(&identity, &handle, &proof));
                if first.contains_key(&identity) {
                    proptest::prop_assert!(matches!(result, Err(LedgerError::AlreadyRegistered(_))));
                } else {
                    proptest::prop_assert!(result.is_ok());
                    first.insert(identity, handle);
                }
            }

            let count = runtime.block_on(ledger.registration_count()).unwrap();
            proptest::prop_assert_eq!(count, first.len() as u64);
            for (identity, handle) in &first {
                let stored = runtime.block_on(ledger.get_handle(identity)).unwrap();
                proptest::prop_assert_eq!(stored, Some(*handle));
            }
        }
    }
}
