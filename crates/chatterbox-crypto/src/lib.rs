//! Chatterbox Cryptographic Primitives
//!
//! Key material and primitive operations for the Chatterbox double ratchet.
//! Everything here is deterministic given its inputs; randomness is drawn
//! from an [`Entropy`] the caller provides, so tests can replay a run exactly.
//!
//! # Key Lifecycle
//!
//! ```text
//! Identity KeyPair ─┐
//! Ephemeral KeyPair ┼─ 3 x DH ─→ combine ─→ Root Key
//!                   ┘                         │
//!                                             ▼ derive_key(chain label)
//!                                         Chain Key ──derive_key──→ next Chain Key
//!                                             │
//!                                             ▼ derive_key(message label)
//!                                         Message Key
//!                                             │
//!                                             ▼
//!                                  ChaCha20-Poly1305 Ciphertext
//! ```
//!
//! # Security
//!
//! Erasure:
//! - Symmetric secrets live in a [`SecretBuffer`], zero-filled on drop
//! - Private scalars are zeroized by `p256::SecretKey` on drop
//! - `zeroize()` consumes its receiver, so erased keys cannot be reused
//!
//! Authenticity:
//! - ChaCha20-Poly1305 binds ciphertext to caller-supplied associated data
//! - Failed authentication tag -> reject message
//!
//! Provisioning:
//! - A failing random source is a typed [`CryptoError::ProvisioningFailure`],
//!   never a silent fallback

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod entropy;
pub mod error;
pub mod keypair;
pub mod secret;
pub mod symmetric;

pub use aead::{IV_SIZE, TAG_SIZE, decrypt, encrypt, generate_iv};
pub use entropy::{Entropy, OsEntropy, SeededEntropy};
pub use error::CryptoError;
pub use keypair::{
    FINGERPRINT_LENGTH, Fingerprint, KeyPair, PUBLIC_KEY_LENGTH, PublicKey, dh_combine,
};
pub use secret::SecretBuffer;
pub use symmetric::{KEY_SIZE, SymmetricKey};
