//! Producing encrypted inputs.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use futurelove_core::{CiphertextHandle, ContractAddress, FheType, Identity, InputProof};
use futurelove_fhe::{EncryptionBackend, InputBuilder};

use crate::error::RegistrationFailure;
use crate::session::bounded;

/// Turns a plaintext into a `(handle, proof)` pair bound to one
/// `(contract, identity)`.
#[derive(Clone)]
pub struct EncryptionCoordinator {
    backend: Arc<dyn EncryptionBackend>,
    timeout: Duration,
}

impl EncryptionCoordinator {
    pub fn new(backend: Arc<dyn EncryptionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Encrypt `value` as a `width`-bit integer.
    ///
    /// A value that does not fit fails with
    /// [`RegistrationFailure::Encoding`] before the backend is contacted.
    pub async fn encrypt(
        &self,
        value: u64,
        width: FheType,
        contract: ContractAddress,
        identity: Identity,
    ) -> Result<(CiphertextHandle, InputProof), RegistrationFailure> {
        let input = InputBuilder::new(self.backend.network_public_key(), contract, identity)
            .seal(value, width)?;

        let verified = bounded(self.timeout, "input verification", self.backend.verify_input(input))
            .await
            .map_err(RegistrationFailure::Timeout)??;

        debug!(identity = %identity, handle = ?verified.handle, "input verified");
        Ok((verified.handle, verified.proof))
    }
}
