//! Fuzz target for the receive path
//!
//! Drives a live Alice/Bob session with an adversarial network that
//! reorders, duplicates, drops and tampers with messages.
//!
//! # Strategy
//!
//! - Arbitrary interleaving of sends from both parties
//! - Delivery of any previously sent message, any number of times
//! - Header and ciphertext tampering before delivery
//! - Raw bytes pushed through the wire decoder into the receiver
//!
//! # Invariants
//!
//! - Receive never panics
//! - A successful decrypt of a genuine message returns exactly what was sent
//! - A tampered message never decrypts
//! - Cache size never exceeds the configured bound

#![no_main]

use arbitrary::Arbitrary;
use chatterbox_core::{Chatter, ChatterConfig, Message};
use chatterbox_crypto::{PublicKey, SeededEntropy};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct ReceiveScenario {
    /// Seed for both parties' key material
    seed: u64,
    /// Erase cached keys after use
    purge_used_keys: bool,
    /// Network events, applied in order
    events: Vec<Event>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Event {
    /// Alice sends a message to Bob
    AliceSends(Vec<u8>),
    /// Bob sends a message to Alice
    BobSends(Vec<u8>),
    /// Deliver a previously sent message (index wraps)
    Deliver(u16),
    /// Deliver a tampered copy of a previously sent message
    Tamper(u16, Tampering),
    /// Decode raw bytes and hand the result to Bob
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Arbitrary)]
enum Tampering {
    Counter(u32),
    LastUpdate(u32),
    CiphertextBit(u16, u8),
    IvBit(u8, u8),
    Truncate(u16),
    Reflect,
}

const MAX_CACHED_KEYS: usize = 64;

fuzz_target!(|scenario: ReceiveScenario| {
    let config = ChatterConfig {
        max_skip: 128,
        max_cached_keys: MAX_CACHED_KEYS,
        purge_used_keys: scenario.purge_used_keys,
    };
    let mut alice =
        Chatter::with_config(config.clone(), SeededEntropy::new(scenario.seed)).expect("alice");
    let mut bob = Chatter::with_config(config, SeededEntropy::new(!scenario.seed)).expect("bob");
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();

    let alice_ephemeral = alice.initiate_handshake(&bob_id).expect("initiate");
    let (bob_ephemeral, _) = bob.return_handshake(&alice_id, &alice_ephemeral).expect("return");
    alice.finalize_handshake(&bob_id, &bob_ephemeral).expect("finalize");

    let mut sent: Vec<(Message, Vec<u8>)> = Vec::new();

    for event in scenario.events.into_iter().take(256) {
        match event {
            Event::AliceSends(plaintext) => {
                let msg = alice.send_message(&bob_id, &plaintext).expect("alice send");
                sent.push((msg, plaintext));
            },
            Event::BobSends(plaintext) => {
                let msg = bob.send_message(&alice_id, &plaintext).expect("bob send");
                sent.push((msg, plaintext));
            },
            Event::Deliver(index) => {
                let Some((msg, plaintext)) = pick(&sent, index) else { continue };
                let receiver = if msg.receiver == bob_id { &mut bob } else { &mut alice };
                if let Ok(decrypted) = receiver.receive_message(msg) {
                    assert_eq!(&decrypted, plaintext, "genuine message decrypted wrongly");
                }
            },
            Event::Tamper(index, tampering) => {
                let Some((msg, _)) = pick(&sent, index) else { continue };
                let tampered = tamper(msg, tampering, &alice_id);
                if tampered == *msg {
                    continue;
                }
                let receiver = if msg.receiver == bob_id { &mut bob } else { &mut alice };
                assert!(receiver.receive_message(&tampered).is_err(), "tampered message decrypted");
            },
            Event::Raw(bytes) => {
                if let Ok(msg) = Message::from_bytes(&bytes) {
                    let _ = bob.receive_message(&msg);
                }
            },
        }

        for (chatter, partner) in [(&alice, &bob_id), (&bob, &alice_id)] {
            if let Some(session) = chatter.session(partner) {
                assert!(session.cached_key_count() <= MAX_CACHED_KEYS);
            }
        }
    }
});

fn pick(sent: &[(Message, Vec<u8>)], index: u16) -> Option<&(Message, Vec<u8>)> {
    if sent.is_empty() {
        return None;
    }
    sent.get(usize::from(index) % sent.len())
}

fn tamper(msg: &Message, tampering: Tampering, alice_id: &PublicKey) -> Message {
    let mut tampered = msg.clone();
    match tampering {
        Tampering::Counter(counter) => tampered.counter = counter,
        Tampering::LastUpdate(last_update) => tampered.last_update = last_update,
        Tampering::CiphertextBit(position, mask) => {
            let len = tampered.ciphertext.len();
            tampered.ciphertext[usize::from(position) % len] ^= mask;
        },
        Tampering::IvBit(position, mask) => {
            let len = tampered.iv.len();
            tampered.iv[usize::from(position) % len] ^= mask;
        },
        Tampering::Truncate(len) => tampered.ciphertext.truncate(usize::from(len)),
        Tampering::Reflect => tampered.next_dh_ratchet = *alice_id,
    }
    tampered
}
