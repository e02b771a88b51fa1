//! Wire message and associated-data binding.
//!
//! The associated data authenticates every header field without encrypting
//! it. Tampering with the counter, epoch marker or either identity breaks the
//! AEAD tag, so the receiver can trust the header it used to pick a key.
//!
//! # Associated Data Layout
//!
//! ```text
//! ┌─────────┬─────────────┬────────────┬──────────────┬────────────────────┐
//! │ counter │ last_update │ fp(sender) │ fp(receiver) │ fp(next_dh_ratchet)│
//! │ u32 LE  │ u32 LE      │ 32 bytes   │ 32 bytes     │ 32 bytes           │
//! └─────────┴─────────────┴────────────┴──────────────┴────────────────────┘
//! ```

use chatterbox_crypto::{FINGERPRINT_LENGTH, IV_SIZE, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Length of the associated data: two counters and three fingerprints.
pub const ASSOCIATED_DATA_LENGTH: usize = 8 + 3 * FINGERPRINT_LENGTH;

/// An encrypted message with the header needed to decrypt it.
///
/// Immutable once built by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender's long-term identity
    pub sender: PublicKey,
    /// Receiver's long-term identity
    pub receiver: PublicKey,
    /// Sender's current DH ratchet public key (marks the epoch)
    pub next_dh_ratchet: PublicKey,
    /// Position of this message in the sender's send counter
    pub counter: u32,
    /// Send counter at which the sender's current epoch started
    pub last_update: u32,
    /// Ciphertext including the 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
    /// Random 12-byte AEAD nonce
    pub iv: [u8; IV_SIZE],
}

impl Message {
    /// Associated data bound into the AEAD tag.
    pub fn associated_data(&self) -> [u8; ASSOCIATED_DATA_LENGTH] {
        encode_associated_data(
            self.counter,
            self.last_update,
            Some(&self.sender),
            Some(&self.receiver),
            Some(&self.next_dh_ratchet),
        )
    }

    /// Serialize to CBOR for a transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let wire = WireMessage {
            sender: self.sender.to_sec1_bytes(),
            receiver: self.receiver.to_sec1_bytes(),
            next_dh_ratchet: self.next_dh_ratchet.to_sec1_bytes(),
            counter: self.counter,
            last_update: self.last_update,
            iv: self.iv,
            ciphertext: self.ciphertext.clone(),
        };

        let mut data = Vec::new();
        let Ok(()) = ciborium::ser::into_writer(&wire, &mut data) else {
            unreachable!("CBOR serialization into a Vec cannot fail");
        };
        data
    }

    /// Parse CBOR produced by [`Message::to_bytes`].
    ///
    /// # Errors
    ///
    /// - `MalformedMessage` if the bytes are not a message or a key is not a
    ///   valid curve point
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChatError> {
        let wire: WireMessage = ciborium::de::from_reader(bytes)
            .map_err(|e| ChatError::MalformedMessage { reason: format!("CBOR decode failed: {e}") })?;

        Ok(Self {
            sender: PublicKey::from_sec1_bytes(&wire.sender)?,
            receiver: PublicKey::from_sec1_bytes(&wire.receiver)?,
            next_dh_ratchet: PublicKey::from_sec1_bytes(&wire.next_dh_ratchet)?,
            counter: wire.counter,
            last_update: wire.last_update,
            ciphertext: wire.ciphertext,
            iv: wire.iv,
        })
    }
}

/// Build associated data from header fields.
///
/// An absent key leaves its fingerprint section as zero bytes.
pub fn encode_associated_data(
    counter: u32,
    last_update: u32,
    sender: Option<&PublicKey>,
    receiver: Option<&PublicKey>,
    next_dh_ratchet: Option<&PublicKey>,
) -> [u8; ASSOCIATED_DATA_LENGTH] {
    let mut buf = [0u8; ASSOCIATED_DATA_LENGTH];

    buf[0..4].copy_from_slice(&counter.to_le_bytes());
    buf[4..8].copy_from_slice(&last_update.to_le_bytes());

    for (slot, key) in [sender, receiver, next_dh_ratchet].into_iter().enumerate() {
        if let Some(key) = key {
            let start = 8 + slot * FINGERPRINT_LENGTH;
            buf[start..start + FINGERPRINT_LENGTH].copy_from_slice(key.fingerprint().as_bytes());
        }
    }

    buf
}

/// CBOR shape of a [`Message`]. Public keys travel as uncompressed SEC1.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    sender: Vec<u8>,
    receiver: Vec<u8>,
    next_dh_ratchet: Vec<u8>,
    counter: u32,
    last_update: u32,
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use chatterbox_crypto::{KeyPair, SeededEntropy};

    use super::*;

    fn key(seed: u64) -> PublicKey {
        *KeyPair::generate(&SeededEntropy::new(seed)).unwrap().public_key()
    }

    fn test_message() -> Message {
        Message {
            sender: key(1),
            receiver: key(2),
            next_dh_ratchet: key(3),
            counter: 7,
            last_update: 5,
            ciphertext: vec![1, 2, 3, 4, 5, 6, 7, 8],
            iv: [0xAB; IV_SIZE],
        }
    }

    #[test]
    fn associated_data_layout() {
        let msg = test_message();
        let aad = msg.associated_data();

        assert_eq!(aad.len(), 104);
        assert_eq!(&aad[0..4], &[7, 0, 0, 0]);
        assert_eq!(&aad[4..8], &[5, 0, 0, 0]);
        assert_eq!(&aad[8..40], msg.sender.fingerprint().as_bytes());
        assert_eq!(&aad[40..72], msg.receiver.fingerprint().as_bytes());
        assert_eq!(&aad[72..104], msg.next_dh_ratchet.fingerprint().as_bytes());
    }

    #[test]
    fn absent_keys_leave_zero_sections() {
        let aad = encode_associated_data(0x0102_0304, 1, None, None, None);

        assert_eq!(hex::encode(&aad[0..8]), "0403020101000000");
        assert!(aad[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn associated_data_changes_with_counter() {
        let msg = test_message();
        let mut bumped = msg.clone();
        bumped.counter += 1;

        assert_ne!(msg.associated_data(), bumped.associated_data());
    }

    #[test]
    fn wire_roundtrip() {
        let original = test_message();
        let decoded = Message::from_bytes(&original.to_bytes()).unwrap();

        assert_eq!(original, decoded);
        assert_eq!(original.associated_data(), decoded.associated_data());
    }

    #[test]
    fn garbage_is_malformed() {
        let result = Message::from_bytes(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ChatError::MalformedMessage { .. })));
    }

    #[test]
    fn invalid_point_is_malformed() {
        let wire = WireMessage {
            sender: vec![0x04; 65],
            receiver: key(2).to_sec1_bytes(),
            next_dh_ratchet: key(3).to_sec1_bytes(),
            counter: 1,
            last_update: 1,
            iv: [0; IV_SIZE],
            ciphertext: vec![],
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&wire, &mut bytes).unwrap();

        assert!(matches!(Message::from_bytes(&bytes), Err(ChatError::MalformedMessage { .. })));
    }
}
