//! Thread-safe session store.
//!
//! Same protocol as [`crate::Chatter`], callable through `&self`:
//!
//! ```text
//! RwLock<HashMap<Fingerprint, Arc<Mutex<Option<Session>>>>>
//!   │ read lock: look up and clone the session handle, then release
//!   │ write lock: insert or remove a session (handshake, end)
//!   └─ Mutex<Option<Session>>: held for the whole send / receive / finalize
//! ```
//!
//! Operations on one session serialize; operations on different sessions
//! only contend on the brief table read. Ending a session empties the slot
//! under its lock, so a caller still holding the handle sees `NoOpenSession`.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, Mutex, RwLock},
};

use chatterbox_crypto::{Entropy, Fingerprint, KeyPair, OsEntropy, PublicKey, SymmetricKey};

use crate::{
    chatter::{open, seal},
    config::ChatterConfig,
    error::ChatError,
    handshake,
    message::Message,
    ratchet::Session,
};

/// Emptied when the session is ended.
type SessionHandle = Arc<Mutex<Option<Session>>>;

/// Session engine shareable between threads.
pub struct SharedChatter<E: Entropy = OsEntropy> {
    identity: KeyPair,
    sessions: RwLock<HashMap<Fingerprint, SessionHandle>>,
    config: ChatterConfig,
    entropy: E,
}

impl SharedChatter<OsEntropy> {
    /// Create a shared chatter with a fresh identity, OS randomness and
    /// default configuration.
    ///
    /// # Errors
    ///
    /// - `ProvisioningFailure` if the OS random source fails
    pub fn new() -> Result<Self, ChatError> {
        Self::with_config(ChatterConfig::default(), OsEntropy)
    }
}

impl<E: Entropy> SharedChatter<E> {
    /// Create a shared chatter with a fresh identity drawn from `entropy`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if a bound in `config` is zero
    /// - `ProvisioningFailure` if `entropy` fails
    pub fn with_config(config: ChatterConfig, entropy: E) -> Result<Self, ChatError> {
        config.validate()?;
        let identity = KeyPair::generate(&entropy)?;
        tracing::debug!(identity = %identity.public_key().fingerprint(), "shared chatter created");

        Ok(Self { identity, sessions: RwLock::new(HashMap::new()), config, entropy })
    }

    /// Our long-term identity public key.
    pub fn identity(&self) -> &PublicKey {
        self.identity.public_key()
    }

    /// True if a session exists with `partner`.
    ///
    /// # Errors
    ///
    /// - `LockPoisoned` if the session table lock is poisoned
    pub fn has_session(&self, partner: &PublicKey) -> Result<bool, ChatError> {
        let sessions = self.sessions.read().map_err(|_| ChatError::LockPoisoned)?;
        Ok(sessions.contains_key(&partner.fingerprint()))
    }

    /// Number of open sessions.
    ///
    /// # Errors
    ///
    /// - `LockPoisoned` if the session table lock is poisoned
    pub fn session_count(&self) -> Result<usize, ChatError> {
        let sessions = self.sessions.read().map_err(|_| ChatError::LockPoisoned)?;
        Ok(sessions.len())
    }

    /// Start a handshake with `partner`. See [`crate::Chatter::initiate_handshake`].
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyExists` if a session with `partner` is open
    /// - `ProvisioningFailure` if key generation fails
    /// - `LockPoisoned` if the session table lock is poisoned
    pub fn initiate_handshake(&self, partner: &PublicKey) -> Result<PublicKey, ChatError> {
        let mut sessions = self.sessions.write().map_err(|_| ChatError::LockPoisoned)?;
        let Entry::Vacant(slot) = sessions.entry(partner.fingerprint()) else {
            return Err(ChatError::SessionAlreadyExists { partner: partner.fingerprint() });
        };

        let session = handshake::initiate(&self.entropy)?;
        let ephemeral = *session.ratchet_public_key();
        slot.insert(Arc::new(Mutex::new(Some(session))));

        tracing::debug!(partner = %partner.fingerprint(), "handshake initiated");
        Ok(ephemeral)
    }

    /// Answer a handshake started by `partner`. See
    /// [`crate::Chatter::return_handshake`].
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyExists` if a session with `partner` is open
    /// - `ProvisioningFailure` if key generation fails
    /// - `LockPoisoned` if the session table lock is poisoned
    pub fn return_handshake(
        &self,
        partner: &PublicKey,
        partner_ephemeral: &PublicKey,
    ) -> Result<(PublicKey, SymmetricKey), ChatError> {
        let mut sessions = self.sessions.write().map_err(|_| ChatError::LockPoisoned)?;
        let Entry::Vacant(slot) = sessions.entry(partner.fingerprint()) else {
            return Err(ChatError::SessionAlreadyExists { partner: partner.fingerprint() });
        };

        let (session, confirmation) =
            handshake::respond(&self.identity, partner, partner_ephemeral, &self.entropy)?;
        let ephemeral = *session.ratchet_public_key();
        slot.insert(Arc::new(Mutex::new(Some(session))));

        tracing::debug!(partner = %partner.fingerprint(), "handshake returned");
        Ok((ephemeral, confirmation))
    }

    /// Complete a handshake we initiated. See
    /// [`crate::Chatter::finalize_handshake`].
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no handshake was initiated with `partner`
    /// - `SessionAlreadyExists` if the handshake was already finalized
    /// - `LockPoisoned` if a lock is poisoned
    pub fn finalize_handshake(
        &self,
        partner: &PublicKey,
        partner_ephemeral: &PublicKey,
    ) -> Result<SymmetricKey, ChatError> {
        let handle = self.handle(partner)?;
        let mut slot = handle.lock().map_err(|_| ChatError::LockPoisoned)?;
        let session = live(&mut slot, partner)?;
        let confirmation = handshake::finalize(session, &self.identity, partner, partner_ephemeral)?;

        tracing::debug!(partner = %partner.fingerprint(), "handshake finalized");
        Ok(confirmation)
    }

    /// Encrypt `plaintext` for `partner`. See [`crate::Chatter::send_message`].
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no session with `partner` is open
    /// - `HandshakeIncomplete` if the handshake is not finalized
    /// - `ProvisioningFailure` if the random source fails
    /// - `CounterExhausted` if the send counter reached `u32::MAX`
    /// - `LockPoisoned` if a lock is poisoned
    pub fn send_message(&self, partner: &PublicKey, plaintext: &[u8]) -> Result<Message, ChatError> {
        self.send_on(&self.handle(partner)?, partner, plaintext)
    }

    /// Decrypt a message. See [`crate::Chatter::receive_message`].
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no session with the sender is open
    /// - `WrongRecipient` if the message is addressed to someone else
    /// - `HandshakeIncomplete` if the handshake is not finalized
    /// - `TooManySkipped` if the counter is too far ahead
    /// - `CounterExhausted` if the counter cannot advance past `u32::MAX`
    /// - `DecryptionFailed` if no key is available or authentication fails
    /// - `LockPoisoned` if a lock is poisoned
    pub fn receive_message(&self, message: &Message) -> Result<Vec<u8>, ChatError> {
        self.receive_on(&self.handle(&message.sender)?, message)
    }

    /// Erase and discard the session with `partner`.
    ///
    /// Waits for an in-flight operation on that session to finish.
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no session with `partner` is open
    /// - `LockPoisoned` if a lock is poisoned
    pub fn end_session(&self, partner: &PublicKey) -> Result<(), ChatError> {
        let handle = {
            let mut sessions = self.sessions.write().map_err(|_| ChatError::LockPoisoned)?;
            sessions
                .remove(&partner.fingerprint())
                .ok_or_else(|| ChatError::NoOpenSession { partner: partner.fingerprint() })?
        };

        let taken = handle.lock().map_err(|_| ChatError::LockPoisoned)?.take();
        if let Some(mut session) = taken {
            session.wipe();
        }

        tracing::debug!(partner = %partner.fingerprint(), "session ended");
        Ok(())
    }

    fn send_on(
        &self,
        handle: &SessionHandle,
        partner: &PublicKey,
        plaintext: &[u8],
    ) -> Result<Message, ChatError> {
        let mut slot = handle.lock().map_err(|_| ChatError::LockPoisoned)?;
        let session = live(&mut slot, partner)?;

        seal(session, &self.identity, partner, plaintext, &self.entropy)
    }

    fn receive_on(&self, handle: &SessionHandle, message: &Message) -> Result<Vec<u8>, ChatError> {
        let mut slot = handle.lock().map_err(|_| ChatError::LockPoisoned)?;
        let session = live(&mut slot, &message.sender)?;

        open(session, self.identity.public_key(), message, &self.config)
    }

    fn handle(&self, partner: &PublicKey) -> Result<SessionHandle, ChatError> {
        let sessions = self.sessions.read().map_err(|_| ChatError::LockPoisoned)?;
        sessions
            .get(&partner.fingerprint())
            .cloned()
            .ok_or_else(|| ChatError::NoOpenSession { partner: partner.fingerprint() })
    }
}

/// The session in `slot`, unless it was ended after the handle was cloned.
fn live<'a>(
    slot: &'a mut Option<Session>,
    partner: &PublicKey,
) -> Result<&'a mut Session, ChatError> {
    slot.as_mut().ok_or_else(|| ChatError::NoOpenSession { partner: partner.fingerprint() })
}

impl<E: Entropy> std::fmt::Debug for SharedChatter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChatter")
            .field("identity", self.identity.public_key())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
