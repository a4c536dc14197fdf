//! Client configuration.

use std::time::Duration;

use futurelove_core::FheType;

/// Client configuration.
///
/// Every wait on an external party is bounded by one of these timeouts.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Encrypted width of the sequence.
    pub sequence_width: FheType,
    /// Bound on producing a handle and proof.
    pub encryption_timeout: Duration,
    /// Bound on each credential signature.
    pub signature_timeout: Duration,
    /// Bound on each node request (nonce, submission, reads).
    pub request_timeout: Duration,
    /// Bound on waiting for a receipt.
    pub confirmation_timeout: Duration,
    /// Receipt polling interval.
    pub poll_interval: Duration,
    /// Bound on the decryption backend.
    pub decryption_timeout: Duration,
    /// Validity window requested for new authorizations.
    pub authorization_ttl: Duration,
    /// A cached authorization is reused only while it stays valid for at
    /// least this long.
    pub authorization_reuse_margin: Duration,
    /// Resubmissions after a nonce race with another session of the same
    /// identity.
    pub max_nonce_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sequence_width: FheType::Uint32,
            encryption_timeout: Duration::from_secs(30),
            signature_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
            decryption_timeout: Duration::from_secs(30),
            authorization_ttl: Duration::from_secs(24 * 60 * 60),
            authorization_reuse_margin: Duration::from_secs(60),
            max_nonce_retries: 3,
        }
    }
}

impl ClientConfig {
    /// Short timeouts for in-process deployments.
    pub fn local() -> Self {
        Self {
            encryption_timeout: Duration::from_secs(2),
            signature_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(2),
            decryption_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }
}
