//! Triple Diffie-Hellman key agreement.
//!
//! ```text
//!   Initiator (A)                              Responder (B)
//!   ─────────────                              ─────────────
//!   initiate: eph_A ───────────────────────────────>
//!                                              respond:
//!                                                K1 = DH(id_A,  eph_B)
//!                                                K2 = DH(eph_A, id_B)
//!                                                K3 = DH(eph_A, eph_B)
//!              <─────────────────────────────── eph_B, confirm_B
//!   finalize:
//!     K1 = DH(eph_B, id_A)
//!     K2 = DH(id_B,  eph_A)
//!     K3 = DH(eph_B, eph_A)
//!   root = combine(K1, K2, K3) on both sides
//!   confirm = root.derive_key(HANDSHAKE_CHECK_LABEL)
//! ```
//!
//! The initiator gets the send chain and the responder the receive chain, so
//! the initiator can talk first without another round trip. Comparing the
//! two confirmation values is left to the caller.

use chatterbox_crypto::{Entropy, KeyPair, PublicKey, SymmetricKey, dh_combine};

use crate::{
    error::ChatError,
    ratchet::{CHAIN_LABEL, HANDSHAKE_CHECK_LABEL, Session},
};

/// Start a session as initiator.
///
/// The session has no root key until [`finalize`] runs.
pub(crate) fn initiate(entropy: &(impl Entropy + ?Sized)) -> Result<Session, ChatError> {
    Ok(Session::new(KeyPair::generate(entropy)?, 0))
}

/// Answer an initiator's ephemeral key.
///
/// Returns the new session (holding our ephemeral as its first ratchet key)
/// and the confirmation value.
pub(crate) fn respond(
    identity: &KeyPair,
    partner_identity: &PublicKey,
    partner_ephemeral: &PublicKey,
    entropy: &(impl Entropy + ?Sized),
) -> Result<(Session, SymmetricKey), ChatError> {
    let mut session = Session::new(KeyPair::generate(entropy)?, 1);

    let k1 = dh_combine(partner_identity, &session.my_ratchet);
    let k2 = dh_combine(partner_ephemeral, identity);
    let k3 = dh_combine(partner_ephemeral, &session.my_ratchet);

    let root = fold_root(k1, k2, k3);
    let confirmation = root.derive_key(HANDSHAKE_CHECK_LABEL);

    session.receive_chain = Some(root.derive_key(CHAIN_LABEL));
    session.root_chain = Some(root);
    session.partner_ratchet = Some(*partner_ephemeral);

    Ok((session, confirmation))
}

/// Complete the initiator side with the responder's ephemeral key.
///
/// # Errors
///
/// - `SessionAlreadyExists` if this session already has a root key
pub(crate) fn finalize(
    session: &mut Session,
    identity: &KeyPair,
    partner_identity: &PublicKey,
    partner_ephemeral: &PublicKey,
) -> Result<SymmetricKey, ChatError> {
    if session.is_established() {
        return Err(ChatError::SessionAlreadyExists { partner: partner_identity.fingerprint() });
    }

    let k1 = dh_combine(partner_ephemeral, identity);
    let k2 = dh_combine(partner_identity, &session.my_ratchet);
    let k3 = dh_combine(partner_ephemeral, &session.my_ratchet);

    let root = fold_root(k1, k2, k3);
    let confirmation = root.derive_key(HANDSHAKE_CHECK_LABEL);

    session.send_chain = Some(root.derive_key(CHAIN_LABEL));
    session.root_chain = Some(root);
    session.receive_counter = 1;
    session.partner_ratchet = Some(*partner_ephemeral);

    Ok(confirmation)
}

/// `combine(K1, K2, K3)`, erasing the inputs.
fn fold_root(k1: SymmetricKey, k2: SymmetricKey, k3: SymmetricKey) -> SymmetricKey {
    let root = SymmetricKey::combine(&[&k1, &k2, &k3]);
    k1.zeroize();
    k2.zeroize();
    k3.zeroize();
    root
}

#[cfg(test)]
mod tests {
    use chatterbox_crypto::{OsEntropy, SeededEntropy};

    use super::*;

    #[test]
    fn both_sides_derive_same_confirmation() {
        let alice = KeyPair::generate(&OsEntropy).unwrap();
        let bob = KeyPair::generate(&OsEntropy).unwrap();

        let mut alice_session = initiate(&OsEntropy).unwrap();
        let alice_ephemeral = *alice_session.ratchet_public_key();

        let (bob_session, bob_confirm) =
            respond(&bob, alice.public_key(), &alice_ephemeral, &OsEntropy).unwrap();
        let bob_ephemeral = *bob_session.ratchet_public_key();

        let alice_confirm =
            finalize(&mut alice_session, &alice, bob.public_key(), &bob_ephemeral).unwrap();

        assert_eq!(alice_confirm, bob_confirm);
    }

    #[test]
    fn initiator_send_chain_matches_responder_receive_chain() {
        let entropy = SeededEntropy::new(21);
        let alice = KeyPair::generate(&entropy).unwrap();
        let bob = KeyPair::generate(&entropy).unwrap();

        let mut alice_session = initiate(&entropy).unwrap();
        let alice_ephemeral = *alice_session.ratchet_public_key();
        let (bob_session, _) =
            respond(&bob, alice.public_key(), &alice_ephemeral, &entropy).unwrap();
        let bob_ephemeral = *bob_session.ratchet_public_key();
        let _ = finalize(&mut alice_session, &alice, bob.public_key(), &bob_ephemeral).unwrap();

        assert_eq!(alice_session.send_chain, bob_session.receive_chain);
        assert_eq!(alice_session.root_chain, bob_session.root_chain);
        assert!(bob_session.awaiting_send_ratchet());
    }

    #[test]
    fn initial_counters() {
        let entropy = SeededEntropy::new(4);
        let alice = KeyPair::generate(&entropy).unwrap();
        let bob = KeyPair::generate(&entropy).unwrap();

        let mut alice_session = initiate(&entropy).unwrap();
        assert_eq!(alice_session.send_counter(), 1);
        assert_eq!(alice_session.last_update(), 1);
        assert_eq!(alice_session.receive_counter(), 0);
        assert!(!alice_session.is_established());

        let alice_ephemeral = *alice_session.ratchet_public_key();
        let (bob_session, _) =
            respond(&bob, alice.public_key(), &alice_ephemeral, &entropy).unwrap();
        assert_eq!(bob_session.receive_counter(), 1);
        assert_eq!(bob_session.partner_ratchet_key(), Some(&alice_ephemeral));

        let bob_ephemeral = *bob_session.ratchet_public_key();
        let _ = finalize(&mut alice_session, &alice, bob.public_key(), &bob_ephemeral).unwrap();
        assert_eq!(alice_session.receive_counter(), 1);
        assert_eq!(alice_session.partner_ratchet_key(), Some(&bob_ephemeral));
    }

    #[test]
    fn wrong_identity_breaks_agreement() {
        let entropy = SeededEntropy::new(8);
        let alice = KeyPair::generate(&entropy).unwrap();
        let bob = KeyPair::generate(&entropy).unwrap();
        let mallory = KeyPair::generate(&entropy).unwrap();

        let mut alice_session = initiate(&entropy).unwrap();
        let alice_ephemeral = *alice_session.ratchet_public_key();

        // Bob believes he is talking to Mallory
        let (bob_session, bob_confirm) =
            respond(&bob, mallory.public_key(), &alice_ephemeral, &entropy).unwrap();
        let bob_ephemeral = *bob_session.ratchet_public_key();
        let alice_confirm =
            finalize(&mut alice_session, &alice, bob.public_key(), &bob_ephemeral).unwrap();

        assert_ne!(alice_confirm, bob_confirm);
    }

    #[test]
    fn finalize_twice_is_rejected() {
        let entropy = SeededEntropy::new(13);
        let alice = KeyPair::generate(&entropy).unwrap();
        let bob = KeyPair::generate(&entropy).unwrap();

        let mut alice_session = initiate(&entropy).unwrap();
        let alice_ephemeral = *alice_session.ratchet_public_key();
        let (bob_session, _) =
            respond(&bob, alice.public_key(), &alice_ephemeral, &entropy).unwrap();
        let bob_ephemeral = *bob_session.ratchet_public_key();

        let _ = finalize(&mut alice_session, &alice, bob.public_key(), &bob_ephemeral).unwrap();
        let again = finalize(&mut alice_session, &alice, bob.public_key(), &bob_ephemeral);

        assert!(matches!(again, Err(ChatError::SessionAlreadyExists { .. })));
    }
}
