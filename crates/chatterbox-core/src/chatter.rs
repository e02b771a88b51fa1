//! Session store.
//!
//! A `Chatter` owns one long-term identity and at most one [`Session`] per
//! partner, keyed by the partner's identity fingerprint. It drives the
//! handshake, then hands every send and receive to the session's ratchet.

use std::collections::{HashMap, hash_map::Entry};

use chatterbox_crypto::{
    Entropy, Fingerprint, KeyPair, OsEntropy, PublicKey, SymmetricKey, decrypt, encrypt,
    generate_iv,
};

use crate::{
    config::ChatterConfig,
    error::ChatError,
    handshake,
    message::{Message, encode_associated_data},
    ratchet::Session,
};

/// Single-threaded session engine.
///
/// See [`crate::SharedChatter`] for a variant that can be shared between
/// threads.
pub struct Chatter<E: Entropy = OsEntropy> {
    /// Long-term identity key pair.
    identity: KeyPair,

    /// Open sessions by partner identity fingerprint.
    sessions: HashMap<Fingerprint, Session>,

    config: ChatterConfig,

    entropy: E,
}

impl Chatter<OsEntropy> {
    /// Create a chatter with a fresh identity, OS randomness and default
    /// configuration.
    ///
    /// # Errors
    ///
    /// - `ProvisioningFailure` if the OS random source fails
    pub fn new() -> Result<Self, ChatError> {
        Self::with_config(ChatterConfig::default(), OsEntropy)
    }
}

impl<E: Entropy> Chatter<E> {
    /// Create a chatter with a fresh identity drawn from `entropy`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if a bound in `config` is zero
    /// - `ProvisioningFailure` if `entropy` fails
    pub fn with_config(config: ChatterConfig, entropy: E) -> Result<Self, ChatError> {
        config.validate()?;
        let identity = KeyPair::generate(&entropy)?;
        tracing::debug!(identity = %identity.public_key().fingerprint(), "chatter created");

        Ok(Self { identity, sessions: HashMap::new(), config, entropy })
    }

    /// Our long-term identity public key.
    pub fn identity(&self) -> &PublicKey {
        self.identity.public_key()
    }

    /// Active configuration.
    pub fn config(&self) -> &ChatterConfig {
        &self.config
    }

    /// True if a session (finalized or not) exists with `partner`.
    pub fn has_session(&self, partner: &PublicKey) -> bool {
        self.sessions.contains_key(&partner.fingerprint())
    }

    /// Session state for `partner`, for inspection.
    pub fn session(&self, partner: &PublicKey) -> Option<&Session> {
        self.sessions.get(&partner.fingerprint())
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start a handshake with `partner`.
    ///
    /// Returns our ephemeral public key, to be delivered to the partner.
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyExists` if a session with `partner` is open
    /// - `ProvisioningFailure` if key generation fails
    pub fn initiate_handshake(&mut self, partner: &PublicKey) -> Result<PublicKey, ChatError> {
        let Entry::Vacant(slot) = self.sessions.entry(partner.fingerprint()) else {
            return Err(ChatError::SessionAlreadyExists { partner: partner.fingerprint() });
        };

        let session = handshake::initiate(&self.entropy)?;
        let ephemeral = *session.ratchet_public_key();
        slot.insert(session);

        tracing::debug!(partner = %partner.fingerprint(), "handshake initiated");
        Ok(ephemeral)
    }

    /// Answer a handshake started by `partner`.
    ///
    /// Returns our ephemeral public key and the confirmation value.
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyExists` if a session with `partner` is open
    /// - `ProvisioningFailure` if key generation fails
    pub fn return_handshake(
        &mut self,
        partner: &PublicKey,
        partner_ephemeral: &PublicKey,
    ) -> Result<(PublicKey, SymmetricKey), ChatError> {
        let Entry::Vacant(slot) = self.sessions.entry(partner.fingerprint()) else {
            return Err(ChatError::SessionAlreadyExists { partner: partner.fingerprint() });
        };

        let (session, confirmation) =
            handshake::respond(&self.identity, partner, partner_ephemeral, &self.entropy)?;
        let ephemeral = *session.ratchet_public_key();
        slot.insert(session);

        tracing::debug!(partner = %partner.fingerprint(), "handshake returned");
        Ok((ephemeral, confirmation))
    }

    /// Complete a handshake we initiated.
    ///
    /// Returns the confirmation value, which must equal the partner's.
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no handshake was initiated with `partner`
    /// - `SessionAlreadyExists` if the handshake was already finalized
    pub fn finalize_handshake(
        &mut self,
        partner: &PublicKey,
        partner_ephemeral: &PublicKey,
    ) -> Result<SymmetricKey, ChatError> {
        let Some(session) = self.sessions.get_mut(&partner.fingerprint()) else {
            return Err(ChatError::NoOpenSession { partner: partner.fingerprint() });
        };
        let confirmation = handshake::finalize(session, &self.identity, partner, partner_ephemeral)?;

        tracing::debug!(partner = %partner.fingerprint(), "handshake finalized");
        Ok(confirmation)
    }

    /// Encrypt `plaintext` for `partner`.
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no session with `partner` is open
    /// - `HandshakeIncomplete` if the handshake is not finalized
    /// - `ProvisioningFailure` if the random source fails
    /// - `CounterExhausted` if the send counter reached `u32::MAX`
    pub fn send_message(
        &mut self,
        partner: &PublicKey,
        plaintext: &[u8],
    ) -> Result<Message, ChatError> {
        let Some(session) = self.sessions.get_mut(&partner.fingerprint()) else {
            return Err(ChatError::NoOpenSession { partner: partner.fingerprint() });
        };

        seal(session, &self.identity, partner, plaintext, &self.entropy)
    }

    /// Decrypt a message from the partner named in its `sender` field.
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no session with the sender is open
    /// - `WrongRecipient` if the message is addressed to someone else
    /// - `HandshakeIncomplete` if the handshake is not finalized
    /// - `TooManySkipped` if the counter is too far ahead
    /// - `CounterExhausted` if the counter cannot advance past `u32::MAX`
    /// - `DecryptionFailed` if no key is available or authentication fails
    pub fn receive_message(&mut self, message: &Message) -> Result<Vec<u8>, ChatError> {
        let Some(session) = self.sessions.get_mut(&message.sender.fingerprint()) else {
            return Err(ChatError::NoOpenSession { partner: message.sender.fingerprint() });
        };

        open(session, self.identity.public_key(), message, &self.config)
    }

    /// Erase and discard the session with `partner`.
    ///
    /// # Errors
    ///
    /// - `NoOpenSession` if no session with `partner` is open
    pub fn end_session(&mut self, partner: &PublicKey) -> Result<(), ChatError> {
        let Some(mut session) = self.sessions.remove(&partner.fingerprint()) else {
            return Err(ChatError::NoOpenSession { partner: partner.fingerprint() });
        };

        session.wipe();
        tracing::debug!(partner = %partner.fingerprint(), "session ended");
        Ok(())
    }
}

impl<E: Entropy> std::fmt::Debug for Chatter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chatter")
            .field("identity", self.identity.public_key())
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Build an encrypted message on an open session.
///
/// The IV and any fresh ratchet key are drawn before the ratchet moves, so a
/// failing random source leaves the session untouched.
pub(crate) fn seal(
    session: &mut Session,
    identity: &KeyPair,
    partner: &PublicKey,
    plaintext: &[u8],
    entropy: &(impl Entropy + ?Sized),
) -> Result<Message, ChatError> {
    let iv = generate_iv(entropy)?;
    let outgoing =
        session.next_send_key(|| KeyPair::generate(entropy).map_err(ChatError::from), partner)?;

    let aad = encode_associated_data(
        outgoing.counter,
        outgoing.last_update,
        Some(identity.public_key()),
        Some(partner),
        Some(&outgoing.ratchet_public),
    );
    let ciphertext = encrypt(&outgoing.message_key, &iv, plaintext, &aad);
    outgoing.message_key.zeroize();

    tracing::debug!(
        partner = %partner.fingerprint(),
        counter = outgoing.counter,
        last_update = outgoing.last_update,
        "message sealed"
    );

    Ok(Message {
        sender: *identity.public_key(),
        receiver: *partner,
        next_dh_ratchet: outgoing.ratchet_public,
        counter: outgoing.counter,
        last_update: outgoing.last_update,
        ciphertext,
        iv,
    })
}

/// Decrypt a message on the sender's session.
pub(crate) fn open(
    session: &mut Session,
    identity: &PublicKey,
    message: &Message,
    config: &ChatterConfig,
) -> Result<Vec<u8>, ChatError> {
    if message.receiver != *identity {
        return Err(ChatError::WrongRecipient {
            expected: identity.fingerprint(),
            actual: message.receiver.fingerprint(),
        });
    }

    let partner = message.sender.fingerprint();
    let message_key = session
        .message_key_for(
            &message.next_dh_ratchet,
            message.counter,
            message.last_update,
            config,
            &message.sender,
        )
        .inspect_err(|err| {
            tracing::warn!(%partner, counter = message.counter, %err, "no message key");
        })?;

    let result = decrypt(&message_key, &message.iv, &message.ciphertext, &message.associated_data());
    message_key.zeroize();

    match result {
        Ok(plaintext) => {
            if config.purge_used_keys {
                session.forget_cached_key(message.counter);
            }
            tracing::debug!(%partner, counter = message.counter, "message opened");
            Ok(plaintext)
        },
        Err(err) => {
            tracing::warn!(%partner, counter = message.counter, %err, "message rejected");
            Err(err.into())
        },
    }
}
