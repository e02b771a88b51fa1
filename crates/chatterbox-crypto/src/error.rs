//! Error types for key material and primitive operations

use thiserror::Error;

/// Errors from cryptographic primitive operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The random source failed or could not produce a usable private scalar.
    ///
    /// Indicates a broken execution environment. Callers decide process-level
    /// policy (abort, retry, shut down).
    #[error("provisioning failure: {reason}")]
    ProvisioningFailure {
        /// What went wrong while provisioning key material
        reason: String,
    },

    /// AEAD authentication failed (wrong key, corrupted ciphertext or
    /// tampered associated data)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Bytes do not encode a valid point on the curve
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Why the encoding was rejected
        reason: String,
    },
}

impl CryptoError {
    /// Returns true if this error is fatal (unrecoverable)
    ///
    /// A failed random source cannot be recovered from within the engine.
    /// Decryption and decoding failures are caused by a single bad input.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ProvisioningFailure { .. } => true,
            Self::DecryptionFailed { .. } | Self::InvalidPublicKey { .. } => false,
        }
    }
}
