//! Authenticated encryption using `ChaCha20-Poly1305`
//!
//! Functions are pure apart from [`generate_iv`], which draws from the
//! caller's [`Entropy`].

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{entropy::Entropy, error::CryptoError, symmetric::SymmetricKey};

/// Size of the AEAD nonce (IV) in bytes
pub const IV_SIZE: usize = 12;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Draw a fresh random IV.
pub fn generate_iv(entropy: &(impl Entropy + ?Sized)) -> Result<[u8; IV_SIZE], CryptoError> {
    let mut iv = [0u8; IV_SIZE];
    entropy.try_fill(&mut iv)?;
    Ok(iv)
}

/// Encrypt `plaintext` under `key`, authenticating `aad`.
///
/// Returns `ciphertext || tag`.
///
/// # Security
///
/// - Caller MUST NOT reuse an (key, iv) pair. Message keys are single-use and
///   IVs are random, so the protocol never does.
pub fn encrypt(key: &SymmetricKey, iv: &[u8; IV_SIZE], plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
    else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Decrypt `ciphertext || tag` under `key`, verifying `aad`.
///
/// # Errors
///
/// - `DecryptionFailed`: wrong key, corrupted ciphertext or tampered `aad`
pub fn decrypt(
    key: &SymmetricKey,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("ciphertext shorter than {TAG_SIZE}-byte tag"),
        });
    }

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    cipher.decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad }).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}
