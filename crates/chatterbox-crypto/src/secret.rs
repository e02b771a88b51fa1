//! Fixed-size secret storage that erases itself

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fixed-size buffer for secret bytes.
///
/// The buffer is zero-filled when it goes out of scope, on every exit path
/// including early `?` returns and panics. All symmetric secrets in this crate
/// live inside one.
#[derive(Clone)]
pub struct SecretBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SecretBuffer<N> {
    /// Take ownership of `bytes`.
    ///
    /// The caller's copy is not erased; pass a value that is about to be
    /// dropped or erase it afterwards.
    pub fn new(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// All-zero buffer, to be filled in place.
    pub fn zeroed() -> Self {
        Self { bytes: [0u8; N] }
    }

    /// Borrow the secret bytes.
    pub fn expose(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Mutably borrow the secret bytes.
    pub fn expose_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// True if every byte is zero.
    pub fn is_zeroed(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> Zeroize for SecretBuffer<N> {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
    }
}

impl<const N: usize> Drop for SecretBuffer<N> {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl<const N: usize> ZeroizeOnDrop for SecretBuffer<N> {}

impl<const N: usize> fmt::Debug for SecretBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer<{N}>(..)")
    }
}
