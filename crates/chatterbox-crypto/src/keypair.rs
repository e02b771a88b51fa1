//! P-256 key pairs, public keys, fingerprints and Diffie-Hellman

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use p256::{ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint};
use sha2::{Digest, Sha256};

use crate::{
    entropy::Entropy,
    error::CryptoError,
    secret::SecretBuffer,
    symmetric::{KEY_SIZE, SymmetricKey},
};

/// Length of a public key fingerprint in bytes
pub const FINGERPRINT_LENGTH: usize = 32;

/// Width of one affine coordinate in the fingerprint preimage
const COORDINATE_SIZE: usize = 32;

/// Length of an uncompressed SEC1 point (`0x04 || X || Y`)
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Attempts at drawing a valid scalar before giving up.
///
/// A uniformly random 32-byte string is out of range for P-256 with
/// probability below 2^-32, so hitting this limit means the random source is
/// broken.
const MAX_SCALAR_ATTEMPTS: usize = 8;

/// SHA-256 digest of a public key.
///
/// Stable identity for a key: used to key session tables and bound into
/// message associated data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are plenty to tell keys apart in logs
        write!(f, "Fingerprint(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// An elliptic-curve point on P-256.
///
/// Immutable and cheap to copy. Equality and hashing go through the
/// fingerprint, so two encodings of the same point are the same key.
#[derive(Clone, Copy)]
pub struct PublicKey {
    point: p256::PublicKey,
    fingerprint: Fingerprint,
}

impl PublicKey {
    fn from_point(point: p256::PublicKey) -> Self {
        let fingerprint = fingerprint_of(&point);
        Self { point, fingerprint }
    }

    /// SHA-256 over `pad32(X) || pad32(Y)`, big-endian.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Uncompressed SEC1 encoding (65 bytes).
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.point.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Parse a SEC1-encoded point (compressed or uncompressed).
    ///
    /// Rejects the identity and points not on the curve.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let point = p256::PublicKey::from_sec1_bytes(bytes).map_err(|_| {
            CryptoError::InvalidPublicKey {
                reason: format!("{} bytes do not encode a P-256 point", bytes.len()),
            }
        })?;
        Ok(Self::from_point(point))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({:?})", self.fingerprint)
    }
}

fn fingerprint_of(point: &p256::PublicKey) -> Fingerprint {
    let encoded = point.to_encoded_point(false);
    let (Some(x), Some(y)) = (encoded.x(), encoded.y()) else {
        unreachable!("uncompressed encoding of a non-identity point has both coordinates");
    };

    // Coordinates are already fixed-width big-endian field elements; the
    // right-aligned copy keeps the layout explicit.
    let mut preimage = [0u8; 2 * COORDINATE_SIZE];
    preimage[COORDINATE_SIZE - x.len()..COORDINATE_SIZE].copy_from_slice(x);
    preimage[2 * COORDINATE_SIZE - y.len()..].copy_from_slice(y);

    Fingerprint(Sha256::digest(preimage).into())
}

/// A P-256 key pair.
///
/// The private scalar is zeroized when the pair is dropped, so replacing a
/// ratchet key pair by assignment erases the old one.
pub struct KeyPair {
    secret: p256::SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from `entropy`.
    ///
    /// # Errors
    ///
    /// - `ProvisioningFailure` if the random source fails or keeps producing
    ///   out-of-range scalars
    pub fn generate(entropy: &(impl Entropy + ?Sized)) -> Result<Self, CryptoError> {
        let mut candidate = SecretBuffer::<KEY_SIZE>::zeroed();

        for _ in 0..MAX_SCALAR_ATTEMPTS {
            entropy.try_fill(candidate.expose_mut())?;
            if let Ok(secret) = p256::SecretKey::from_slice(candidate.expose()) {
                return Ok(Self::from_secret(secret));
            }
        }

        Err(CryptoError::ProvisioningFailure {
            reason: format!("no valid P-256 scalar after {MAX_SCALAR_ATTEMPTS} draws"),
        })
    }

    fn from_secret(secret: p256::SecretKey) -> Self {
        let public = PublicKey::from_point(secret.public_key());
        Self { secret, public }
    }

    /// The public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Erase the private scalar.
    ///
    /// Consumes the pair; equivalent to dropping it.
    pub fn zeroize(self) {
        drop(self);
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Diffie-Hellman between `public` and the private half of `pair`.
///
/// Returns `SHA-256(x)` where `x` is the 32-byte big-endian x-coordinate of
/// the shared point.
pub fn dh_combine(public: &PublicKey, pair: &KeyPair) -> SymmetricKey {
    let shared = diffie_hellman(pair.secret.to_nonzero_scalar(), public.point.as_affine());
    let mut digest: [u8; KEY_SIZE] = Sha256::digest(shared.raw_secret_bytes()).into();
    let key = SymmetricKey::from_bytes(digest);
    zeroize::Zeroize::zeroize(&mut digest);
    key
}
