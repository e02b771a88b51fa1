//! Error types for session operations

use chatterbox_crypto::{CryptoError, Fingerprint};
use thiserror::Error;

/// Errors from handshake, send, receive and teardown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A handshake was started or answered for a partner that already has a
    /// live session
    #[error("session already open with {partner}")]
    SessionAlreadyExists {
        /// Partner identity fingerprint
        partner: Fingerprint,
    },

    /// No session exists for this partner
    #[error("no open session with {partner}")]
    NoOpenSession {
        /// Partner identity fingerprint
        partner: Fingerprint,
    },

    /// The session exists but the handshake has not produced a root key yet
    #[error("handshake with {partner} is not finalized")]
    HandshakeIncomplete {
        /// Partner identity fingerprint
        partner: Fingerprint,
    },

    /// AEAD authentication failed or no message key is available
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Random source or key generation failed
    #[error("provisioning failure: {reason}")]
    ProvisioningFailure {
        /// What went wrong while provisioning key material
        reason: String,
    },

    /// The message counter is further ahead than the receive chain may skip
    #[error("too many skipped messages: at counter {current}, need {requested} (limit {limit})")]
    TooManySkipped {
        /// Current receive counter
        current: u32,
        /// Counter carried by the message
        requested: u32,
        /// Configured skip limit
        limit: u32,
    },

    /// A message counter reached `u32::MAX`; the session must be re-established
    #[error("message counter exhausted for session with {partner}")]
    CounterExhausted {
        /// Partner identity fingerprint
        partner: Fingerprint,
    },

    /// The message is addressed to a different identity
    #[error("message addressed to {actual}, this identity is {expected}")]
    WrongRecipient {
        /// This chatter's identity fingerprint
        expected: Fingerprint,
        /// Receiver fingerprint carried by the message
        actual: Fingerprint,
    },

    /// Wire bytes could not be decoded into a message
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// Decoder error
        reason: String,
    },

    /// A configuration bound leaves no room to receive messages
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which bound is wrong
        reason: String,
    },

    /// A session lock was poisoned by a panicking thread
    #[error("session lock poisoned")]
    LockPoisoned,
}

impl ChatError {
    /// Returns true if this error is fatal (unrecoverable)
    ///
    /// Fatal errors indicate a broken environment: the random source is gone
    /// or another thread panicked mid-operation. Everything else is caused by
    /// one request or one message and leaves the engine usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ProvisioningFailure { .. } | Self::LockPoisoned => true,

            Self::SessionAlreadyExists { .. }
            | Self::NoOpenSession { .. }
            | Self::HandshakeIncomplete { .. }
            | Self::DecryptionFailed { .. }
            | Self::TooManySkipped { .. }
            | Self::CounterExhausted { .. }
            | Self::InvalidConfig { .. }
            | Self::WrongRecipient { .. }
            | Self::MalformedMessage { .. } => false,
        }
    }
}

impl From<CryptoError> for ChatError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::ProvisioningFailure { reason } => Self::ProvisioningFailure { reason },
            CryptoError::DecryptionFailed { reason } => Self::DecryptionFailed { reason },
            CryptoError::InvalidPublicKey { reason } => Self::MalformedMessage { reason },
        }
    }
}
