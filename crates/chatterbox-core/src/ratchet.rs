//! Double ratchet session state.
//!
//! A [`Session`] couples two ratchets:
//!
//! - Symmetric ratchet: every message advances a chain key one step and
//!   derives a single-use message key from the old position
//! - DH ratchet: whenever a party starts a new reply run it generates a fresh
//!   ratchet key pair, and the DH output is folded into the root chain
//!
//! # State Machine
//!
//! ```text
//!  send side                                 receive side
//! ┌────────────────┐  first send   ┌─────────────┐   ┌───────────────────┐
//! │ awaiting DH    │──────────────>│ chain       │   │ awaiting epoch    │
//! │ step (no chain)│<──────────────│ established │   └───────────────────┘
//! └────────────────┘ peer's new    └─────────────┘     │ new peer ratchet key
//!                    ratchet key                       ↓
//!                                              ┌───────────────────────┐
//!                                              │ chain established,    │
//!                                              │ counter advancing     │
//!                                              └───────────────────────┘
//! ```
//!
//! The step functions [`root_step`] and [`chain_step`] are pure. Session
//! transitions compose them and erase every superseded key.

use std::collections::BTreeMap;

use chatterbox_crypto::{KeyPair, PublicKey, SymmetricKey, dh_combine};

use crate::{config::ChatterConfig, error::ChatError};

/// Label for the handshake confirmation value
pub const HANDSHAKE_CHECK_LABEL: &[u8] = b"HandshakeValidation";

/// Label for re-seeding the root chain on a DH ratchet step
pub const ROOT_LABEL: &[u8] = b"WhisperRatchet";

/// Label for deriving the next chain key
pub const CHAIN_LABEL: &[u8] = b"WhisperMessageKeys";

/// Label for deriving a message key from a chain key
pub const KEY_LABEL: &[u8] = b"WhisperText";

/// Fold a fresh DH output into the root chain.
///
/// `root' = combine(root.derive_key(ROOT_LABEL), shared)`. The intermediate
/// key and `shared` are erased on return.
pub fn root_step(root: &SymmetricKey, shared: SymmetricKey) -> SymmetricKey {
    let temp_root = root.derive_key(ROOT_LABEL);
    let next = SymmetricKey::combine(&[&temp_root, &shared]);
    temp_root.zeroize();
    shared.zeroize();
    next
}

/// One symmetric ratchet step.
///
/// Returns `(next_chain, message_key)`. The old chain key is erased.
pub fn chain_step(chain: SymmetricKey) -> (SymmetricKey, SymmetricKey) {
    let message_key = chain.derive_key(KEY_LABEL);
    let next = chain.derive_key(CHAIN_LABEL);
    chain.zeroize();
    (next, message_key)
}

/// Header values and key for one outgoing message.
pub(crate) struct OutgoingKey {
    pub(crate) message_key: SymmetricKey,
    pub(crate) counter: u32,
    pub(crate) last_update: u32,
    pub(crate) ratchet_public: PublicKey,
}

/// Per-partner ratchet state.
///
/// # Invariants
///
/// - `root_chain` is `None` only between `initiate` and `finalize`
/// - Every cached key belongs to the current receive epoch
/// - `send_counter` only increases
pub struct Session {
    pub(crate) my_ratchet: KeyPair,
    pub(crate) partner_ratchet: Option<PublicKey>,
    pub(crate) root_chain: Option<SymmetricKey>,
    pub(crate) send_chain: Option<SymmetricKey>,
    pub(crate) receive_chain: Option<SymmetricKey>,
    pub(crate) cached_receive_keys: BTreeMap<u32, SymmetricKey>,
    pub(crate) send_counter: u32,
    pub(crate) receive_counter: u32,
    pub(crate) last_update: u32,
}

impl Session {
    pub(crate) fn new(my_ratchet: KeyPair, receive_counter: u32) -> Self {
        Self {
            my_ratchet,
            partner_ratchet: None,
            root_chain: None,
            send_chain: None,
            receive_chain: None,
            cached_receive_keys: BTreeMap::new(),
            send_counter: 1,
            receive_counter,
            last_update: 1,
        }
    }

    /// Our current DH ratchet public key.
    pub fn ratchet_public_key(&self) -> &PublicKey {
        self.my_ratchet.public_key()
    }

    /// Partner's most recent DH ratchet public key, if known.
    pub fn partner_ratchet_key(&self) -> Option<&PublicKey> {
        self.partner_ratchet.as_ref()
    }

    /// Counter the next outgoing message will carry.
    pub fn send_counter(&self) -> u32 {
        self.send_counter
    }

    /// Next counter the receive chain will produce.
    pub fn receive_counter(&self) -> u32 {
        self.receive_counter
    }

    /// Send counter at which the current send epoch started.
    pub fn last_update(&self) -> u32 {
        self.last_update
    }

    /// Number of cached chain snapshots.
    pub fn cached_key_count(&self) -> usize {
        self.cached_receive_keys.len()
    }

    /// True if a snapshot is cached for `counter`.
    pub fn has_cached_key(&self, counter: u32) -> bool {
        self.cached_receive_keys.contains_key(&counter)
    }

    /// True once the handshake has produced a root key.
    pub fn is_established(&self) -> bool {
        self.root_chain.is_some()
    }

    /// True if the next send will perform a DH ratchet step.
    pub fn awaiting_send_ratchet(&self) -> bool {
        self.send_chain.is_none()
    }

    /// Advance the send side and hand out the key for the next message.
    ///
    /// Performs a DH ratchet step first if no send chain exists;
    /// `fresh_ratchet` supplies the new key pair and is only consulted then.
    pub(crate) fn next_send_key(
        &mut self,
        fresh_ratchet: impl FnOnce() -> Result<KeyPair, ChatError>,
        partner: &PublicKey,
    ) -> Result<OutgoingKey, ChatError> {
        let Some(next_counter) = self.send_counter.checked_add(1) else {
            return Err(ChatError::CounterExhausted { partner: partner.fingerprint() });
        };

        let send_chain = match self.send_chain.take() {
            Some(chain) => chain,
            None => self.send_ratchet_step(fresh_ratchet()?, partner)?,
        };

        let (next_chain, message_key) = chain_step(send_chain);
        self.send_chain = Some(next_chain);

        let outgoing = OutgoingKey {
            message_key,
            counter: self.send_counter,
            last_update: self.last_update,
            ratchet_public: *self.my_ratchet.public_key(),
        };
        self.send_counter = next_counter;

        Ok(outgoing)
    }

    /// Replace our ratchet key pair and re-seed the root chain.
    ///
    /// Returns the new send chain.
    fn send_ratchet_step(
        &mut self,
        fresh_ratchet: KeyPair,
        partner: &PublicKey,
    ) -> Result<SymmetricKey, ChatError> {
        let (Some(root), Some(partner_ratchet)) = (&self.root_chain, &self.partner_ratchet) else {
            return Err(ChatError::HandshakeIncomplete { partner: partner.fingerprint() });
        };

        let shared = dh_combine(partner_ratchet, &fresh_ratchet);
        let root = root_step(root, shared);
        let send_chain = root.derive_key(CHAIN_LABEL);

        // Assignment drops (and erases) the superseded root and key pair
        self.root_chain = Some(root);
        self.my_ratchet = fresh_ratchet;
        self.last_update = self.send_counter;

        tracing::debug!(
            partner = %partner.fingerprint(),
            last_update = self.last_update,
            "send-side DH ratchet step"
        );

        Ok(send_chain)
    }

    /// Advance the receive side far enough to decrypt a message and return
    /// its message key.
    ///
    /// Ratchet steps and cache population performed here are kept even if
    /// the caller's AEAD check fails afterwards.
    pub(crate) fn message_key_for(
        &mut self,
        next_dh_ratchet: &PublicKey,
        counter: u32,
        last_update: u32,
        config: &ChatterConfig,
        partner: &PublicKey,
    ) -> Result<SymmetricKey, ChatError> {
        if self.root_chain.is_none() {
            return Err(ChatError::HandshakeIncomplete { partner: partner.fingerprint() });
        }

        if self.partner_ratchet.as_ref() != Some(next_dh_ratchet) {
            self.receive_ratchet_step(next_dh_ratchet, last_update, partner)?;
        }

        if let Some(cached) = self.cached_receive_keys.get(&counter) {
            return Ok(cached.derive_key(KEY_LABEL));
        }

        self.catch_up(counter, config, partner)?;

        self.cached_receive_keys.get(&counter).map(|chain| chain.derive_key(KEY_LABEL)).ok_or_else(
            || ChatError::DecryptionFailed {
                reason: format!(
                    "no message key for counter {counter} (receive counter is {})",
                    self.receive_counter
                ),
            },
        )
    }

    /// Start a new receive epoch keyed off the partner's new ratchet key.
    fn receive_ratchet_step(
        &mut self,
        next_dh_ratchet: &PublicKey,
        last_update: u32,
        partner: &PublicKey,
    ) -> Result<(), ChatError> {
        let Some(root) = &self.root_chain else {
            return Err(ChatError::HandshakeIncomplete { partner: partner.fingerprint() });
        };

        let shared = dh_combine(next_dh_ratchet, &self.my_ratchet);
        let root = root_step(root, shared);
        let receive_chain = root.derive_key(CHAIN_LABEL);

        let flushed = self.cached_receive_keys.len();
        self.root_chain = Some(root);
        self.receive_chain = Some(receive_chain);
        self.receive_counter = last_update;
        self.partner_ratchet = Some(*next_dh_ratchet);

        // Cached snapshots belong to the superseded epoch
        self.cached_receive_keys.clear();

        // Forces a send-side DH step on our next message
        self.send_chain = None;

        tracing::debug!(
            partner = %partner.fingerprint(),
            receive_counter = self.receive_counter,
            flushed,
            "receive-side DH ratchet step"
        );

        Ok(())
    }

    /// Snapshot the receive chain for every counter up to and including
    /// `counter`, advancing it past each one.
    fn catch_up(
        &mut self,
        counter: u32,
        config: &ChatterConfig,
        partner: &PublicKey,
    ) -> Result<(), ChatError> {
        if counter < self.receive_counter {
            return Ok(());
        }

        let steps = counter - self.receive_counter;
        if steps >= config.max_skip {
            return Err(ChatError::TooManySkipped {
                current: self.receive_counter,
                requested: counter,
                limit: config.max_skip,
            });
        }

        let Some(next_counter) = counter.checked_add(1) else {
            return Err(ChatError::CounterExhausted { partner: partner.fingerprint() });
        };

        let Some(mut chain) = self.receive_chain.take() else {
            return Err(ChatError::HandshakeIncomplete { partner: partner.fingerprint() });
        };

        for position in self.receive_counter..=counter {
            self.cached_receive_keys.insert(position, chain.clone());
            chain = chain_step(chain).0;
        }
        self.receive_chain = Some(chain);
        self.receive_counter = next_counter;

        self.evict_excess(config, partner);

        Ok(())
    }

    /// Drop the lowest-counter snapshots beyond the configured cache size.
    fn evict_excess(&mut self, config: &ChatterConfig, partner: &PublicKey) {
        let mut evicted = 0usize;
        while self.cached_receive_keys.len() > config.max_cached_keys {
            if self.cached_receive_keys.pop_first().is_none() {
                break;
            }
            evicted += 1;
        }

        if evicted > 0 {
            tracing::warn!(partner = %partner.fingerprint(), evicted, "evicted skipped message keys");
        }
    }

    /// Erase the cached snapshot for `counter`, if any.
    pub(crate) fn forget_cached_key(&mut self, counter: u32) {
        if let Some(key) = self.cached_receive_keys.remove(&counter) {
            key.zeroize();
        }
    }

    /// Erase every secret this session holds.
    ///
    /// The ratchet key pair is erased when the session itself is dropped.
    pub(crate) fn wipe(&mut self) {
        if let Some(root) = self.root_chain.take() {
            root.zeroize();
        }
        if let Some(chain) = self.send_chain.take() {
            chain.zeroize();
        }
        if let Some(chain) = self.receive_chain.take() {
            chain.zeroize();
        }
        for (_, key) in std::mem::take(&mut self.cached_receive_keys) {
            key.zeroize();
        }
        self.partner_ratchet = None;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ratchet", self.my_ratchet.public_key())
            .field("partner_ratchet", &self.partner_ratchet)
            .field("established", &self.is_established())
            .field("send_counter", &self.send_counter)
            .field("receive_counter", &self.receive_counter)
            .field("last_update", &self.last_update)
            .field("cached_keys", &self.cached_receive_keys.len())
            .finish_non_exhaustive()
    }
}
