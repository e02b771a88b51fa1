//! Tunables for a [`crate::Chatter`]

use crate::error::ChatError;

/// Default upper bound on receive-chain steps taken for one message.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

/// Default upper bound on cached skipped-message keys per session.
pub const DEFAULT_MAX_CACHED_KEYS: usize = 2000;

/// Session engine configuration
///
/// Protocol labels are not configurable; both peers must agree on them. These
/// knobs only bound local resource use and replay behavior, so peers may
/// differ.
///
/// # Limits
///
/// Out-of-order delivery is only guaranteed within these bounds. A batch of
/// more than `max_skip` messages from one epoch cannot be received newest
/// first, and keys for more than `max_cached_keys` pending counters are not
/// all retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatterConfig {
    /// Maximum number of chain steps one incoming message may force. Bounds
    /// the work an attacker can cause with a huge counter. Must be at least 1.
    pub max_skip: u32,

    /// Maximum cached chain snapshots per session. When exceeded, the lowest
    /// counters are evicted and erased first. Must be at least 1, since the
    /// snapshot for the counter being received is cached too.
    pub max_cached_keys: usize,

    /// Erase a cached key after it decrypts a message successfully. Replayed
    /// messages then fail with `DecryptionFailed`.
    pub purge_used_keys: bool,
}

impl Default for ChatterConfig {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_cached_keys: DEFAULT_MAX_CACHED_KEYS,
            purge_used_keys: false,
        }
    }
}

impl ChatterConfig {
    /// Check that every bound leaves room to receive a message.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `max_skip` or `max_cached_keys` is zero
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.max_skip == 0 {
            return Err(ChatError::InvalidConfig {
                reason: "max_skip must be at least 1".to_string(),
            });
        }
        if self.max_cached_keys == 0 {
            return Err(ChatError::InvalidConfig {
                reason: "max_cached_keys must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_used_keys() {
        let config = ChatterConfig::default();
        assert!(!config.purge_used_keys);
        assert_eq!(config.max_skip, DEFAULT_MAX_SKIP);
        assert_eq!(config.max_cached_keys, DEFAULT_MAX_CACHED_KEYS);
    }

    #[test]
    fn default_is_valid() {
        assert!(ChatterConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let no_cache = ChatterConfig { max_cached_keys: 0, ..ChatterConfig::default() };
        assert!(matches!(no_cache.validate(), Err(ChatError::InvalidConfig { .. })));

        let no_skip = ChatterConfig { max_skip: 0, ..ChatterConfig::default() };
        assert!(matches!(no_skip.validate(), Err(ChatError::InvalidConfig { .. })));

        let minimal = ChatterConfig { max_skip: 1, max_cached_keys: 1, purge_used_keys: true };
        assert!(minimal.validate().is_ok());
    }
}
