//! End-to-end conversations between two chatters.
//!
//! These tests verify critical invariants:
//! - Both sides derive the same handshake confirmation
//! - In-order, shuffled and bidirectional delivery decrypt correctly
//! - A DH ratchet step makes the previous epoch's messages undecryptable
//! - Ending a session erases it and blocks further traffic

use chatterbox_core::{ChatError, Chatter, ChatterConfig, Message};
use chatterbox_crypto::{PublicKey, SeededEntropy};

fn chatter(seed: u64) -> Chatter<SeededEntropy> {
    Chatter::with_config(ChatterConfig::default(), SeededEntropy::new(seed))
        .expect("identity generation should succeed")
}

/// Run the three-step handshake and check both confirmations match.
fn handshake(alice: &mut Chatter<SeededEntropy>, bob: &mut Chatter<SeededEntropy>) {
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();

    let alice_ephemeral = alice.initiate_handshake(&bob_id).expect("initiate should succeed");
    let (bob_ephemeral, bob_confirm) =
        bob.return_handshake(&alice_id, &alice_ephemeral).expect("return should succeed");
    let alice_confirm =
        alice.finalize_handshake(&bob_id, &bob_ephemeral).expect("finalize should succeed");

    assert_eq!(alice_confirm, bob_confirm, "handshake confirmations must match");
}

fn send_all(from: &mut Chatter<SeededEntropy>, to: &PublicKey, texts: &[&str]) -> Vec<Message> {
    texts
        .iter()
        .map(|text| from.send_message(to, text.as_bytes()).expect("send should succeed"))
        .collect()
}

/// Alice talks, Bob answers, across a re-established session.
#[test]
fn demonstration_conversation() {
    let mut alice = chatter(1);
    let mut bob = chatter(2);
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();

    handshake(&mut alice, &mut bob);

    // One direction, in order
    let in_order = [
        "Hello World to you Bob",
        "You know I have been thinking about you lately",
        "Maybe we should get back together :)",
        "Wanna meet tommorrow??",
    ];
    for (msg, expected) in send_all(&mut alice, &bob_id, &in_order).iter().zip(in_order) {
        let plaintext = bob.receive_message(msg).expect("in-order receive should succeed");
        assert_eq!(plaintext, expected.as_bytes());
    }

    // Fresh session, shuffled delivery
    alice.end_session(&bob_id).expect("alice end should succeed");
    bob.end_session(&alice_id).expect("bob end should succeed");
    handshake(&mut alice, &mut bob);

    let batch = ["Message 1", "Message 2", "Message 3", "Message 4", "Message 5"];
    let sent = send_all(&mut alice, &bob_id, &batch);
    for index in [2, 0, 4, 1, 3] {
        let msg = &sent[index];
        let plaintext = bob.receive_message(msg).expect("shuffled receive should succeed");
        assert_eq!(plaintext, batch[(msg.counter - 1) as usize].as_bytes());
    }

    // Bidirectional: every change of speaker is a DH ratchet step
    let reply = bob.send_message(&alice_id, b"Hello world to you too Alice...").unwrap();
    assert_eq!(alice.receive_message(&reply).unwrap(), b"Hello world to you too Alice...");

    let follow_up = alice.send_message(&bob_id, b"Sooo... whats your answer?").unwrap();
    assert_ne!(follow_up.next_dh_ratchet, sent[0].next_dh_ratchet);
    assert_eq!(bob.receive_message(&follow_up).unwrap(), b"Sooo... whats your answer?");

    for text in [
        "Don't you think its too late to come back?",
        "Sorry but this is not going to work.",
        "I already met somebody new. Sorry. Maybe in next life",
    ] {
        let msg = bob.send_message(&alice_id, text.as_bytes()).unwrap();
        assert_eq!(alice.receive_message(&msg).unwrap(), text.as_bytes());
    }

    // Replay: the cached key is kept by default, so the copy decrypts too
    let replayed = alice.send_message(&bob_id, b"Bob I really need you PLZ").unwrap();
    let first = bob.receive_message(&replayed).unwrap();
    let second = bob.receive_message(&replayed).unwrap();
    assert_eq!(first, second);

    alice.end_session(&bob_id).expect("alice end should succeed");
    bob.end_session(&alice_id).expect("bob end should succeed");
    assert_eq!(alice.session_count(), 0);
    assert_eq!(bob.session_count(), 0);
}

/// Messages from a previous epoch are unusable once a new one starts.
#[test]
fn dh_step_isolates_previous_epoch() {
    let mut alice = chatter(3);
    let mut bob = chatter(4);
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();
    handshake(&mut alice, &mut bob);

    let early = send_all(&mut alice, &bob_id, &["early 1", "early 2"]);
    bob.receive_message(&early[1]).unwrap();
    assert!(bob.session(&alice_id).unwrap().has_cached_key(1));

    let reply = bob.send_message(&alice_id, b"reply").unwrap();
    alice.receive_message(&reply).unwrap();

    let next_epoch = alice.send_message(&bob_id, b"new epoch").unwrap();
    assert_eq!(bob.receive_message(&next_epoch).unwrap(), b"new epoch");

    let session = bob.session(&alice_id).unwrap();
    assert!(!session.has_cached_key(1), "DH step must flush the previous epoch's cache");
    assert_eq!(session.cached_key_count(), 1);

    let stale = bob.receive_message(&early[0]);
    assert!(matches!(stale, Err(ChatError::DecryptionFailed { .. })));
}

/// Every header field is authenticated.
#[test]
fn tampered_header_fails_authentication() {
    let mut alice = chatter(5);
    let mut bob = chatter(6);
    let bob_id = *bob.identity();
    handshake(&mut alice, &mut bob);

    let msg = alice.send_message(&bob_id, b"authentic").unwrap();

    let mut wrong_epoch_marker = msg.clone();
    wrong_epoch_marker.last_update = 2;
    let result = bob.receive_message(&wrong_epoch_marker);
    assert!(matches!(result, Err(ChatError::DecryptionFailed { .. })));

    let mut flipped = msg.clone();
    flipped.ciphertext[0] ^= 0x01;
    let result = bob.receive_message(&flipped);
    assert!(matches!(result, Err(ChatError::DecryptionFailed { .. })));

    // The untouched original still decrypts: failures keep the cache
    assert_eq!(bob.receive_message(&msg).unwrap(), b"authentic");
}

/// Messages survive a trip through the CBOR wire format.
#[test]
fn wire_encoding_carries_messages() {
    let mut alice = chatter(7);
    let mut bob = chatter(8);
    let bob_id = *bob.identity();
    handshake(&mut alice, &mut bob);

    let msg = alice.send_message(&bob_id, b"over the wire").unwrap();
    let decoded = Message::from_bytes(&msg.to_bytes()).expect("decode should succeed");

    assert_eq!(bob.receive_message(&decoded).unwrap(), b"over the wire");
}

/// A counter far beyond the skip limit is refused.
#[test]
fn skip_limit_refuses_huge_counter() {
    let config = ChatterConfig { max_skip: 8, ..ChatterConfig::default() };
    let mut alice = Chatter::with_config(config.clone(), SeededEntropy::new(9)).unwrap();
    let mut bob = Chatter::with_config(config, SeededEntropy::new(10)).unwrap();
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();
    handshake(&mut alice, &mut bob);

    let sent = send_all(&mut alice, &bob_id, &["m"; 12]);

    let result = bob.receive_message(&sent[11]);
    assert!(matches!(result, Err(ChatError::TooManySkipped { requested: 12, limit: 8, .. })));
    assert_eq!(bob.session(&alice_id).unwrap().receive_counter(), 1);

    // Within the limit, the same session keeps working
    assert_eq!(bob.receive_message(&sent[5]).unwrap(), b"m");
}

/// Ending a session erases it on both sides independently.
#[test]
fn end_session_blocks_traffic() {
    let mut alice = chatter(11);
    let mut bob = chatter(12);
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();
    handshake(&mut alice, &mut bob);

    let in_flight = alice.send_message(&bob_id, b"in flight").unwrap();
    bob.end_session(&alice_id).unwrap();

    assert!(!bob.has_session(&alice_id));
    assert!(matches!(bob.receive_message(&in_flight), Err(ChatError::NoOpenSession { .. })));
    assert!(matches!(bob.send_message(&alice_id, b"x"), Err(ChatError::NoOpenSession { .. })));
    assert!(matches!(bob.end_session(&alice_id), Err(ChatError::NoOpenSession { .. })));
}
