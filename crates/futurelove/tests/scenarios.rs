//! End-to-end registration and decryption scenarios over an in-process
//! deployment.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use futurelove::chain::RevertReason;
use futurelove::core::{
    CiphertextHandle, Clock, Ed25519PublicKey, Ed25519Signature, Identity, InputProof, Keypair,
    ManualClock,
};
use futurelove::fhe::{AuthorizationRequest, DecryptionBackend, FheError, X25519StaticSecret};
use futurelove::ledger::{
    EncryptedSequence, Ledger, LedgerConfig, LedgerError, MemoryLedger, SqliteLedger,
};
use futurelove::{
    Category, Client, ClientError, CredentialSigner, DecryptionFailure, DecryptionState, LocalSigner,
    RegistrationFailure, RegistrationState, SignerError,
};
use futurelove_testkit::{Deployment, RefusingSigner};

/// Signer that counts how often it is asked.
struct CountingSigner {
    inner: LocalSigner,
    calls: AtomicUsize,
}

impl CountingSigner {
    fn new(keypair: Keypair) -> Self {
        Self {
            inner: LocalSigner::new(keypair),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSigner for CountingSigner {
    fn public_key(&self) -> Ed25519PublicKey {
        self.inner.public_key()
    }

    async fn sign(&self, message: &[u8]) -> Result<Ed25519Signature, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(message).await
    }
}

/// Ledger whose next write fails once with a storage fault.
struct FlakyLedger {
    inner: MemoryLedger,
    fail_next: AtomicBool,
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn register(
        &self,
        caller: &Identity,
        handle: &CiphertextHandle,
        proof: &InputProof,
    ) -> Result<EncryptedSequence, LedgerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("disk busy".into()));
        }
        self.inner.register(caller, handle, proof).await
    }

    async fn is_registered(&self, identity: &Identity) -> Result<bool, LedgerError> {
        self.inner.is_registered(identity).await
    }

    async fn get_handle(&self, identity: &Identity) -> Result<Option<CiphertextHandle>, LedgerError> {
        self.inner.get_handle(identity).await
    }

    async fn get_record(&self, identity: &Identity) -> Result<Option<EncryptedSequence>, LedgerError> {
        self.inner.get_record(identity).await
    }

    async fn is_allowed(&self, handle: &CiphertextHandle, account: &Identity) -> Result<bool, LedgerError> {
        self.inner.is_allowed(handle, account).await
    }

    async fn registration_count(&self) -> Result<u64, LedgerError> {
        self.inner.registration_count().await
    }

    fn config(&self) -> &LedgerConfig {
        self.inner.config()
    }
}

fn registration_failure(err: ClientError) -> RegistrationFailure {
    match err {
        ClientError::Registration(failure) => failure,
        other => panic!("expected registration failure, got {:?}", other),
    }
}

fn decryption_failure(err: ClientError) -> DecryptionFailure {
    match err {
        ClientError::Decryption(failure) => failure,
        other => panic!("expected decryption failure, got {:?}", other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_then_decrypt() -> anyhow::Result<()> {
    let deployment = Deployment::new();
    let alice = deployment.client(Keypair::generate());

    assert!(!alice.is_registered().await?);
    let outcome = alice.register_sequence(1234567890).await?;
    assert!(alice.is_registered().await?);
    assert_eq!(alice.cached_registration(), Some(true));
    assert_eq!(alice.encrypted_sequence().await?, Some(outcome.handle));
    assert!(matches!(alice.registration_state(), RegistrationState::Done { .. }));

    let decrypted = alice.decrypt_sequence().await?;
    assert_eq!(decrypted.value, 1234567890);
    assert_eq!(decrypted.sequence.to_string(), "1234567890");
    assert_eq!(decrypted.avatar_seed.as_str(), "male-234567890");
    assert!(matches!(
        alice.decryption_state(),
        DecryptionState::Decrypted { value: 1234567890, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_second_registration_rejected_first_value_kept() -> anyhow::Result<()> {
    let deployment = Deployment::new();
    let alice = deployment.client(Keypair::generate());

    alice.register_sequence(1234567890).await?;
    let failure = registration_failure(alice.register_sequence(2222222222).await.unwrap_err());

    assert_eq!(failure, RegistrationFailure::AlreadyRegistered);
    assert!(!failure.is_retryable());
    assert_eq!(
        alice.registration_state(),
        RegistrationState::Failed(RegistrationFailure::AlreadyRegistered)
    );
    assert_eq!(alice.decrypt_sequence().await?.value, 1234567890);
    assert_eq!(deployment.ledger.registration_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_sessions_single_winner() {
    let deployment = Deployment::new();
    let seed = [0x5Au8; 32];
    let first = deployment.client(Keypair::from_seed(&seed));
    let second = deployment.client(Keypair::from_seed(&seed));

    let (a, b) = tokio::join!(first.register_sequence(1111111111), second.register_sequence(22222222));

    let winner = match (a, b) {
        (Ok(_), Err(err)) => {
            assert_eq!(registration_failure(err), RegistrationFailure::AlreadyRegistered);
            1111111111
        }
        (Err(err), Ok(_)) => {
            assert_eq!(registration_failure(err), RegistrationFailure::AlreadyRegistered);
            22222222
        }
        other => panic!("expected exactly one winner, got {:?}", other),
    };

    assert_eq!(first.decrypt_sequence().await.unwrap().value, winner);
    assert_eq!(second.decrypt_sequence().await.unwrap().value, winner);
    assert_eq!(deployment.ledger.registration_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_many_identities_register_concurrently() {
    let deployment = Deployment::new();
    let clients: Vec<Client> = (0..8).map(|_| deployment.client(Keypair::generate())).collect();

    let results = register_all(&clients).await;
    for result in &results {
        assert!(result.is_ok(), "{:?}", result);
    }
    assert_eq!(deployment.ledger.registration_count().await.unwrap(), 8);

    for (i, client) in clients.iter().enumerate() {
        assert_eq!(client.decrypt_sequence().await.unwrap().value, 1_000_000_000 + i as u64);
    }
}

async fn register_all(clients: &[Client]) -> Vec<futurelove::Result<futurelove::RegistrationOutcome>> {
    let mut set = tokio::task::JoinSet::new();
    for (i, session) in clients.iter().map(|c| c.session().clone()).enumerate() {
        set.spawn(async move {
            let client = Client::new(session);
            (i, client.register_sequence(1_000_000_000 + i as u64).await)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok(pair) = joined {
            results.push(pair);
        }
    }
    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}

#[tokio::test]
async fn test_random_sequence_seed_matches() -> anyhow::Result<()> {
    let deployment = Deployment::new();
    let client = deployment.client(Keypair::generate());

    let (sequence, _) = client.register_random(Category::Female).await?;
    assert_eq!(sequence.category(), Category::Female);

    let seed = client.avatar_seed().await?;
    assert_eq!(seed, sequence.avatar_seed());
    assert!(seed.as_str().starts_with("female-"));
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_value_never_submitted() {
    let deployment = Deployment::new();
    let client = deployment.client(Keypair::generate());

    let failure = registration_failure(client.register_sequence(1u64 << 32).await.unwrap_err());
    assert!(matches!(failure, RegistrationFailure::Encoding(_)));
    assert!(!failure.is_retryable());
    assert_eq!(deployment.coprocessor.vault_len(), 0);
    assert_eq!(deployment.node.pending_count().await, 0);
    assert!(!client.refresh_registration().await.unwrap());
}

#[tokio::test]
async fn test_confirmation_timeout_is_retryable() {
    let mut deployment = Deployment::new();
    deployment.config.confirmation_timeout = Duration::from_millis(100);
    let keypair = Keypair::generate();
    let client = deployment.client(keypair.clone());

    deployment.node.pause_blocks();
    let failure = registration_failure(client.register_sequence(1234567890).await.unwrap_err());
    assert!(matches!(failure, RegistrationFailure::Timeout(_)));
    assert!(failure.is_retryable());
    assert!(!client.refresh_registration().await.unwrap());

    // The submitted transaction lands once blocks resume.
    deployment.node.resume_blocks();
    for _ in 0..200 {
        if client.refresh_registration().await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(client.is_registered().await.unwrap());

    let retry = registration_failure(client.register_sequence(1234567890).await.unwrap_err());
    assert_eq!(retry, RegistrationFailure::AlreadyRegistered);
}

#[tokio::test]
async fn test_disconnected_node_is_transport_failure() {
    let deployment = Deployment::new();
    let client = deployment.client(Keypair::generate());

    deployment.node.disconnect();
    let failure = registration_failure(client.register_sequence(42).await.unwrap_err());
    assert!(matches!(failure, RegistrationFailure::Transport(_)));
    assert!(failure.is_retryable());

    deployment.node.reconnect();
    client.register_sequence(42).await.unwrap();
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 42);
}

#[tokio::test]
async fn test_refused_signature_is_terminal() {
    let deployment = Deployment::new();
    let keypair = Keypair::generate();
    let client = deployment.client_for(Arc::new(RefusingSigner::new(&keypair)));

    let failure = registration_failure(client.register_sequence(7).await.unwrap_err());
    assert!(matches!(failure, RegistrationFailure::SignatureRejected(_)));
    assert!(!failure.is_retryable());
    assert_eq!(deployment.ledger.registration_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_slow_signature_times_out() {
    let mut deployment = Deployment::new();
    deployment.config.signature_timeout = Duration::from_millis(50);
    let signer = Arc::new(LocalSigner::new(Keypair::generate()));
    signer.set_delay(Duration::from_secs(5));
    let client = deployment.client_for(signer);

    let failure = registration_failure(client.register_sequence(7).await.unwrap_err());
    assert!(matches!(failure, RegistrationFailure::Timeout(_)));
}

#[tokio::test]
async fn test_second_start_while_in_flight_is_busy() {
    let deployment = Deployment::new();
    let signer = Arc::new(LocalSigner::new(Keypair::generate()));
    signer.set_delay(Duration::from_millis(300));
    let client = deployment.client_for(signer);

    let (first, second) = tokio::join!(client.register_sequence(1), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.register_sequence(2).await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(ClientError::Busy)));
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 1);
}

#[tokio::test]
async fn test_abandoned_registration_returns_to_idle() {
    let deployment = Deployment::new();
    let signer = Arc::new(LocalSigner::new(Keypair::generate()));
    signer.set_delay(Duration::from_millis(500));
    let client = deployment.client_for(signer.clone());

    let abandoned = tokio::time::timeout(Duration::from_millis(50), client.register_sequence(5)).await;
    assert!(abandoned.is_err());
    assert_eq!(client.registration_state(), RegistrationState::Idle);

    signer.set_delay(Duration::ZERO);
    client.register_sequence(5).await.unwrap();
    assert!(matches!(client.registration_state(), RegistrationState::Done { .. }));
}

#[tokio::test]
async fn test_sqlite_backed_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let deployment = Deployment::with_ledger(|config, clock| {
        let ledger = SqliteLedger::open(&path, config).expect("open ledger").with_clock(clock);
        Arc::new(ledger) as Arc<dyn Ledger>
    });
    let alice = deployment.client(Keypair::generate());

    alice.register_sequence(1234567890).await.unwrap();
    let failure = registration_failure(alice.register_sequence(2222222222).await.unwrap_err());
    assert_eq!(failure, RegistrationFailure::AlreadyRegistered);
    assert_eq!(alice.avatar_seed().await.unwrap().as_str(), "male-234567890");
}

#[tokio::test]
async fn test_storage_fault_revert_is_retryable() {
    let deployment = Deployment::with_ledger(|config, clock| {
        Arc::new(FlakyLedger {
            inner: MemoryLedger::with_clock(config, clock),
            fail_next: AtomicBool::new(true),
        }) as Arc<dyn Ledger>
    });
    let client = deployment.client(Keypair::generate());

    let failure = registration_failure(client.register_sequence(1234567890).await.unwrap_err());
    assert!(matches!(
        failure,
        RegistrationFailure::Reverted(RevertReason::Unavailable(_))
    ));
    assert!(failure.is_retryable());
    assert!(!client.refresh_registration().await.unwrap());

    client.register_sequence(1234567890).await.unwrap();
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 1234567890);
}

// ─────────────────────────────────────────────────────────────────────────────
// Status cache
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stale_status_cache_does_not_block_ledger() {
    let deployment = Deployment::new();
    let seed = [0x33u8; 32];
    let tab_one = deployment.client(Keypair::from_seed(&seed));
    let tab_two = deployment.client(Keypair::from_seed(&seed));

    assert!(!tab_one.is_registered().await.unwrap());
    tab_two.register_sequence(1234567890).await.unwrap();

    // The first session still believes it is unregistered.
    assert_eq!(tab_one.cached_registration(), Some(false));
    assert!(!tab_one.is_registered().await.unwrap());

    // Decryption eligibility reads the ledger, not the cache.
    assert_eq!(tab_one.decrypt_sequence().await.unwrap().value, 1234567890);

    // Registration is decided by the ledger and corrects the cache.
    let failure = registration_failure(tab_one.register_sequence(5).await.unwrap_err());
    assert_eq!(failure, RegistrationFailure::AlreadyRegistered);
    assert_eq!(tab_one.cached_registration(), Some(true));
}

#[tokio::test]
async fn test_registration_status_flips_once() {
    let deployment = Deployment::new();
    let client = deployment.client(Keypair::generate());

    assert!(!client.refresh_registration().await.unwrap());
    client.register_sequence(3).await.unwrap();
    assert!(client.refresh_registration().await.unwrap());

    let _ = client.register_sequence(4).await;
    assert!(client.refresh_registration().await.unwrap());
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Decryption
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_decrypt_before_register_nothing_to_decrypt() {
    let deployment = Deployment::new();
    let client = deployment.client(Keypair::generate());

    let failure = decryption_failure(client.decrypt_sequence().await.unwrap_err());
    assert_eq!(failure, DecryptionFailure::NothingToDecrypt);
    assert!(!failure.is_retryable());
    assert_eq!(client.held_authorizations(), 0);
}

#[tokio::test]
async fn test_identities_only_see_their_own_value() {
    let deployment = Deployment::new();
    let alice = deployment.client(Keypair::generate());
    let bob = deployment.client(Keypair::generate());

    alice.register_sequence(1234567890).await.unwrap();
    assert_eq!(
        decryption_failure(bob.decrypt_sequence().await.unwrap_err()),
        DecryptionFailure::NothingToDecrypt
    );

    // Above i32::MAX, still within euint32.
    bob.register_sequence(2222222222).await.unwrap();
    let bobs = bob.decrypt_sequence().await.unwrap();
    assert_eq!(bobs.value, 2222222222);
    assert_ne!(bobs.value, 1234567890);
    assert_eq!(bobs.avatar_seed.as_str(), "male-222222222");

    let alices = alice.decrypt_sequence().await.unwrap();
    assert_eq!(alices.value, 1234567890);
    assert_eq!(alices.avatar_seed.as_str(), "male-234567890");
    assert_ne!(alices.handle, bobs.handle);
}

#[tokio::test]
async fn test_foreign_handle_authorization_refused() {
    let deployment = Deployment::new();
    let alice = deployment.client(Keypair::generate());
    let outcome = alice.register_sequence(1234567890).await.unwrap();

    let mallory = Keypair::generate();
    let reply = X25519StaticSecret::generate();
    let authorization = AuthorizationRequest::new(
        mallory.public_key(),
        outcome.handle,
        deployment.contract,
        deployment.clock.now_millis(),
        Duration::from_secs(60),
        reply.public_key(),
    )
    .sign(&mallory);

    let err = deployment.coprocessor.user_decrypt(&authorization).await.unwrap_err();
    assert!(matches!(err, FheError::Unauthorized(_)));
}

#[tokio::test]
async fn test_repeat_decrypt_served_from_cache() {
    let deployment = Deployment::new();
    let keypair = Keypair::generate();
    let signer = Arc::new(CountingSigner::new(keypair));
    let client = deployment.client_for(signer.clone());

    client.register_sequence(1234567890).await.unwrap();
    let after_registration = signer.calls();

    assert_eq!(client.decrypt_sequence().await.unwrap().value, 1234567890);
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 1234567890);
    assert_eq!(signer.calls(), after_registration + 1);
}

#[tokio::test]
async fn test_decryption_timeout_then_retry_reuses_authorization() {
    let mut deployment = Deployment::new();
    deployment.config.decryption_timeout = Duration::from_millis(50);
    let signer = Arc::new(CountingSigner::new(Keypair::generate()));
    let client = deployment.client_for(signer.clone());
    client.register_sequence(1234567890).await.unwrap();
    let after_registration = signer.calls();

    deployment.coprocessor.set_latency(Duration::from_secs(5));
    let failure = decryption_failure(client.decrypt_sequence().await.unwrap_err());
    assert!(matches!(failure, DecryptionFailure::Timeout(_)));
    assert!(failure.is_retryable());
    assert_eq!(client.held_authorizations(), 1);

    deployment.coprocessor.set_latency(Duration::ZERO);
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 1234567890);
    assert_eq!(signer.calls(), after_registration + 1);
}

#[tokio::test]
async fn test_expired_authorization_evicted_then_renewed() {
    let deployment = Deployment::new();
    let lagging = ManualClock::new(deployment.clock.now_millis() - 2 * 24 * 60 * 60 * 1000);
    let session = deployment
        .session(Keypair::generate())
        .with_clock(Arc::new(lagging.clone()) as Arc<dyn Clock>);
    let client = Client::new(session);
    client.register_sequence(1234567890).await.unwrap();

    // Signed against a clock two days behind: already expired for the service.
    let failure = decryption_failure(client.decrypt_sequence().await.unwrap_err());
    assert_eq!(failure, DecryptionFailure::Expired);
    assert!(failure.is_retryable());
    assert_eq!(client.held_authorizations(), 0);

    lagging.set(deployment.clock.now_millis());
    assert_eq!(client.decrypt_sequence().await.unwrap().value, 1234567890);
}

#[tokio::test]
async fn test_refused_decryption_signature() {
    let deployment = Deployment::new();
    let keypair = Keypair::generate();
    let owner = deployment.client(keypair.clone());
    owner.register_sequence(99).await.unwrap();

    let refusing = deployment.client_for(Arc::new(RefusingSigner::new(&keypair)));
    let failure = decryption_failure(refusing.decrypt_sequence().await.unwrap_err());
    assert!(matches!(failure, DecryptionFailure::SignatureRejected(_)));
    assert!(matches!(refusing.decryption_state(), DecryptionState::Failed(_)));
}
