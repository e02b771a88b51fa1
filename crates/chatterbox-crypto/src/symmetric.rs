//! Symmetric keys and HMAC-SHA256 derivation
//!
//! # Security Properties
//!
//! - One-way: a derived key reveals nothing about its parent
//! - Domain separation: distinct labels yield independent keys
//! - Erasure: key bytes live in a [`SecretBuffer`] and are zeroed on drop

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::secret::SecretBuffer;

type HmacSha256 = Hmac<Sha256>;

/// Size of every symmetric key in bytes
pub const KEY_SIZE: usize = 32;

/// Fixed HMAC key used when folding several keys into one.
const COMBINE_DOMAIN_KEY: &[u8] = b"combine";

/// A 32-byte symmetric key.
///
/// Single owner. [`Clone`] produces an independent copy that is erased
/// independently. [`zeroize`](Self::zeroize) consumes the key, so a key cannot
/// be used after it has been erased.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: SecretBuffer<KEY_SIZE>,
}

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes: SecretBuffer::new(bytes) }
    }

    /// Derive a child key: `HMAC-SHA256(self, label)`.
    pub fn derive_key(&self, label: &[u8]) -> Self {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.bytes.expose()) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(label);
        Self::from_mac(mac)
    }

    /// Fold several keys into one:
    /// `HMAC-SHA256(COMBINE_DOMAIN_KEY, k1 || k2 || ...)`.
    ///
    /// Order matters. Both peers must pass their inputs in the same order.
    pub fn combine(keys: &[&SymmetricKey]) -> Self {
        let Ok(mut mac) = HmacSha256::new_from_slice(COMBINE_DOMAIN_KEY) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        for key in keys {
            mac.update(key.bytes.expose());
        }
        Self::from_mac(mac)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.bytes.expose()
    }

    /// Erase the key.
    ///
    /// Consumes `self`; the bytes are overwritten before the memory is
    /// released. Dropping a key has the same effect, this just makes the
    /// intent visible at the call site.
    pub fn zeroize(self) {
        drop(self);
    }

    fn from_mac(mac: HmacSha256) -> Self {
        let mut output = mac.finalize().into_bytes();
        let mut bytes = SecretBuffer::<KEY_SIZE>::zeroed();
        bytes.expose_mut().copy_from_slice(&output);
        zeroize::Zeroize::zeroize(output.as_mut_slice());
        Self { bytes }
    }
}

/// Constant-time comparison.
impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().as_slice().ct_eq(other.as_bytes().as_slice()).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SymmetricKey {
        let mut bytes = [0u8; KEY_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = i as u8;
        }
        SymmetricKey::from_bytes(bytes)
    }

    #[test]
    fn derive_is_deterministic() {
        let key = test_key();
        assert_eq!(key.derive_key(b"label"), key.derive_key(b"label"));
    }

    #[test]
    fn different_labels_produce_different_keys() {
        let key = test_key();
        assert_ne!(key.derive_key(b"WhisperText"), key.derive_key(b"WhisperMessageKeys"));
    }

    #[test]
    fn derive_matches_hmac_sha256() {
        // RFC 4231 test case 2
        let mut raw = [0u8; KEY_SIZE];
        raw[..4].copy_from_slice(b"Jefe");
        let key = SymmetricKey::from_bytes(raw);

        // A 32-byte key zero-padded from "Jefe" is equivalent under HMAC
        // (keys shorter than the block size are zero-padded).
        let derived = key.derive_key(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(derived.as_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn combine_is_order_sensitive() {
        let a = SymmetricKey::from_bytes([1u8; KEY_SIZE]);
        let b = SymmetricKey::from_bytes([2u8; KEY_SIZE]);

        assert_ne!(SymmetricKey::combine(&[&a, &b]), SymmetricKey::combine(&[&b, &a]));
    }

    #[test]
    fn combine_is_deterministic() {
        let a = SymmetricKey::from_bytes([1u8; KEY_SIZE]);
        let b = SymmetricKey::from_bytes([2u8; KEY_SIZE]);
        let c = SymmetricKey::from_bytes([3u8; KEY_SIZE]);

        assert_eq!(
            SymmetricKey::combine(&[&a, &b, &c]),
            SymmetricKey::combine(&[&a, &b, &c])
        );
    }

    #[test]
    fn clone_is_independent_copy() {
        let key = test_key();
        let copy = key.clone();
        assert_eq!(key, copy);

        copy.zeroize();
        // original is untouched and still usable
        assert_eq!(key.as_bytes()[1], 1);
    }

    #[test]
    fn equality_sees_every_byte() {
        let key = test_key();
        for position in [0, KEY_SIZE / 2, KEY_SIZE - 1] {
            let mut bytes = *key.as_bytes();
            bytes[position] ^= 0x80;
            assert_ne!(key, SymmetricKey::from_bytes(bytes), "byte {position} ignored");
        }
        assert_eq!(key, SymmetricKey::from_bytes(*key.as_bytes()));
    }

    #[test]
    fn debug_is_redacted() {
        assert_eq!(format!("{:?}", test_key()), "SymmetricKey(..)");
    }
}
