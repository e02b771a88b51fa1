//! Random sources for key generation and nonces.
//!
//! Protocol code never reaches for a global RNG. It draws from an [`Entropy`]
//! handed in by the caller, so tests and simulations can substitute a seeded
//! generator and replay a run byte for byte.

use std::{fmt, sync::Mutex};

use rand_chacha::{
    ChaCha20Rng,
    rand_core::{RngCore, SeedableRng},
};

use crate::error::CryptoError;

/// Source of random bytes.
///
/// # Invariants
///
/// - Production implementations MUST be cryptographically secure
/// - A failure is reported, never papered over with weak bytes
pub trait Entropy: Send + Sync {
    /// Fill `buffer` entirely with random bytes.
    fn try_fill(&self, buffer: &mut [u8]) -> Result<(), CryptoError>;
}

/// Operating system entropy (getrandom).
///
/// Uses `/dev/urandom`, `getrandom(2)`, `BCryptGenRandom` and friends
/// depending on the platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl Entropy for OsEntropy {
    fn try_fill(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::fill(buffer)
            .map_err(|e| CryptoError::ProvisioningFailure { reason: format!("OS RNG: {e}") })
    }
}

/// Deterministic ChaCha20 stream seeded from a `u64`.
///
/// NOT for production keys. Same seed, same bytes: used by tests, fuzzing
/// and the demo's `--seed` flag.
pub struct SeededEntropy {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededEntropy {
    /// Create a generator from `seed`.
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }
}

impl fmt::Debug for SeededEntropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SeededEntropy(..)")
    }
}

impl Entropy for SeededEntropy {
    fn try_fill(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        let mut rng = self.rng.lock().map_err(|_| CryptoError::ProvisioningFailure {
            reason: "seeded RNG lock poisoned".to_string(),
        })?;
        rng.try_fill_bytes(buffer)
            .map_err(|e| CryptoError::ProvisioningFailure { reason: format!("seeded RNG: {e}") })
    }
}

impl<E: Entropy + ?Sized> Entropy for &E {
    fn try_fill(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        (**self).try_fill(buffer)
    }
}
