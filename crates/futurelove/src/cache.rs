//! Per-session caches.
//!
//! Nothing here is authoritative. The registration status cache may be
//! stale in either direction and is never consulted to decide whether a
//! registration may proceed; the ledger decides that.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futurelove_core::{CiphertextHandle, ContractAddress};
use futurelove_fhe::{DecryptionAuthorization, X25519StaticSecret};

/// Last known registration status of the session's identity.
#[derive(Debug, Default)]
pub struct StatusCache {
    registered: RwLock<Option<bool>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached status, `None` when never observed.
    pub fn get(&self) -> Option<bool> {
        self.registered.read().ok().and_then(|guard| *guard)
    }

    pub fn set(&self, registered: bool) {
        if let Ok(mut guard) = self.registered.write() {
            *guard = Some(registered);
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.registered.write() {
            *guard = None;
        }
    }
}

/// A signed authorization together with the secret that opens its replies.
#[derive(Clone)]
pub struct HeldAuthorization {
    pub authorization: DecryptionAuthorization,
    pub reply_secret: Arc<X25519StaticSecret>,
}

impl std::fmt::Debug for HeldAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeldAuthorization")
            .field("handle", &self.authorization.handle())
            .field("expiry", &self.authorization.expiry())
            .finish_non_exhaustive()
    }
}

/// Authorizations keyed by `(handle, contract)`.
#[derive(Debug, Default)]
pub struct AuthorizationStore {
    entries: RwLock<HashMap<(CiphertextHandle, ContractAddress), HeldAuthorization>>,
}

impl AuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// An authorization for `(handle, contract)` valid for at least `margin`
    /// past `now`. Stale entries are dropped on the way.
    pub fn fresh(
        &self,
        handle: &CiphertextHandle,
        contract: &ContractAddress,
        now: i64,
        margin: Duration,
    ) -> Option<HeldAuthorization> {
        let key = (*handle, *contract);
        let held = self.entries.read().ok()?.get(&key).cloned()?;
        if held.authorization.covers(handle, contract) && held.authorization.is_fresh(now, margin) {
            return Some(held);
        }
        self.evict(handle, contract);
        None
    }

    pub fn insert(&self, held: HeldAuthorization) {
        let key = (held.authorization.handle(), held.authorization.contract());
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, held);
        }
    }

    pub fn evict(&self, handle: &CiphertextHandle, contract: &ContractAddress) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(*handle, *contract));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decrypted plaintexts keyed by handle.
#[derive(Debug, Default)]
pub struct ValueCache {
    values: RwLock<HashMap<CiphertextHandle, u64>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.values.read().ok()?.get(handle).copied()
    }

    pub fn insert(&self, handle: CiphertextHandle, value: u64) {
        if let Ok(mut values) = self.values.write() {
            values.insert(handle, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futurelove_core::{FheType, Identity, Keypair};
    use futurelove_fhe::AuthorizationRequest;

    fn held(now: i64, ttl: Duration) -> (HeldAuthorization, CiphertextHandle, ContractAddress) {
        let keypair = Keypair::generate();
        let contract = ContractAddress::from_bytes([7u8; 20]);
        let handle = CiphertextHandle::derive(b"ct", &contract, &keypair.identity(), FheType::Uint32);
        let secret = X25519StaticSecret::generate();
        let authorization =
            AuthorizationRequest::new(keypair.public_key(), handle, contract, now, ttl, secret.public_key())
                .sign(&keypair);
        (
            HeldAuthorization {
                authorization,
                reply_secret: Arc::new(secret),
            },
            handle,
            contract,
        )
    }

    #[test]
    fn test_status_cache_starts_unknown() {
        let cache = StatusCache::new();
        assert_eq!(cache.get(), None);
        cache.set(false);
        assert_eq!(cache.get(), Some(false));
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_fresh_authorization_reused() {
        let store = AuthorizationStore::new();
        let (entry, handle, contract) = held(1_000, Duration::from_secs(60));
        store.insert(entry);

        assert!(store.fresh(&handle, &contract, 2_000, Duration::from_secs(1)).is_some());
    }

    #[test]
    fn test_authorization_near_expiry_evicted() {
        let store = AuthorizationStore::new();
        let (entry, handle, contract) = held(1_000, Duration::from_secs(60));
        store.insert(entry);

        // 59.5s in, less than the 1s margin remains.
        assert!(store.fresh(&handle, &contract, 60_500, Duration::from_secs(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_authorization_scoped_to_contract() {
        let store = AuthorizationStore::new();
        let (entry, handle, _) = held(0, Duration::from_secs(60));
        store.insert(entry);

        let other = ContractAddress::from_bytes([8u8; 20]);
        assert!(store.fresh(&handle, &other, 0, Duration::ZERO).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_value_cache() {
        let cache = ValueCache::new();
        let handle = CiphertextHandle::derive(
            b"x",
            &ContractAddress::from_bytes([1u8; 20]),
            &Identity::from_bytes([2u8; 20]),
            FheType::Uint32,
        );
        assert_eq!(cache.get(&handle), None);
        cache.insert(handle, 1234567890);
        assert_eq!(cache.get(&handle), Some(1234567890));
    }
}
