//! Chatterbox demonstration binary.
//!
//! Plays a scripted conversation between Alice and Bob through the session
//! engine: handshake, in-order delivery, shuffled delivery on a fresh
//! session, replies in both directions, a replay attempt and teardown.
//!
//! # Usage
//!
//! ```bash
//! # Random keys and delivery order
//! chatterbox-demo
//!
//! # Reproducible run with a larger shuffled batch and replay protection
//! chatterbox-demo --seed 42 --batch 12 --purge-used-keys
//!
//! # Ratchet internals
//! RUST_LOG=chatterbox_core=debug chatterbox-demo
//! ```

use std::error::Error;

use chatterbox_core::{Chatter, ChatterConfig, Message};
use chatterbox_crypto::{Entropy, OsEntropy, SeededEntropy};
use clap::Parser;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chatterbox session engine demonstration
#[derive(Parser, Debug)]
#[command(name = "chatterbox-demo")]
#[command(about = "Scripted double-ratchet conversation between two parties")]
#[command(version)]
struct Args {
    /// Seed for key material and delivery order (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Number of messages in the shuffled batch
    #[arg(long, default_value = "5")]
    batch: u32,

    /// Erase skipped-message keys after first use, rejecting replays
    #[arg(long)]
    purge_used_keys: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config =
        ChatterConfig { purge_used_keys: args.purge_used_keys, ..ChatterConfig::default() };

    match args.seed {
        Some(seed) => {
            tracing::info!(seed, "deterministic run");
            let entropy = SeededEntropy::new(seed);
            let alice = Chatter::with_config(config.clone(), &entropy)?;
            let bob = Chatter::with_config(config, &entropy)?;
            run(alice, bob, &mut StdRng::seed_from_u64(seed), args.batch)
        },
        None => {
            let alice = Chatter::with_config(config.clone(), OsEntropy)?;
            let bob = Chatter::with_config(config, OsEntropy)?;
            run(alice, bob, &mut StdRng::from_entropy(), args.batch)
        },
    }
}

fn run<E: Entropy>(
    mut alice: Chatter<E>,
    mut bob: Chatter<E>,
    rng: &mut impl Rng,
    batch: u32,
) -> Result<(), Box<dyn Error>> {
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();
    tracing::info!(alice = %alice_id.fingerprint(), bob = %bob_id.fingerprint(), "parties created");

    handshake(&mut alice, &mut bob)?;

    tracing::info!("=== one direction, in order ===");
    let in_order = [
        "Hello World to you Bob",
        "You know I have been thinking about you lately",
        "Maybe we should get back together :)",
        "Wanna meet tommorrow??",
    ];
    let mut sent = Vec::with_capacity(in_order.len());
    for text in in_order {
        sent.push(alice.send_message(&bob_id, text.as_bytes())?);
        tracing::info!(%text, "[alice] sent");
    }
    for (msg, expected) in sent.iter().zip(in_order) {
        let plaintext = bob.receive_message(msg)?;
        report("bob", msg, &plaintext);
        if plaintext != expected.as_bytes() {
            return Err(format!("counter {} decrypted to the wrong text", msg.counter).into());
        }
    }

    tracing::info!("=== fresh session, shuffled delivery ===");
    alice.end_session(&bob_id)?;
    bob.end_session(&alice_id)?;
    handshake(&mut alice, &mut bob)?;

    let mut shuffled = (1..=batch)
        .map(|i| alice.send_message(&bob_id, format!("Message {i}").as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    shuffled.shuffle(rng);
    let order: Vec<u32> = shuffled.iter().map(|msg| msg.counter).collect();
    tracing::info!(?order, "[bob] delivery order");

    for msg in &shuffled {
        match bob.receive_message(msg) {
            Ok(plaintext) => report("bob", msg, &plaintext),
            Err(err) => tracing::error!(counter = msg.counter, %err, "[bob] decryption failed"),
        }
    }

    tracing::info!("=== both directions ===");
    let reply = bob.send_message(&alice_id, b"Hello world to you too Alice...")?;
    report("alice", &reply, &alice.receive_message(&reply)?);

    let follow_up = alice.send_message(&bob_id, b"Sooo... whats your answer?")?;
    report("bob", &follow_up, &bob.receive_message(&follow_up)?);

    for text in [
        "Don't you think its too late to come back?",
        "Sorry but this is not going to work.",
        "I already met somebody new. Sorry. Maybe in next life",
    ] {
        let msg = bob.send_message(&alice_id, text.as_bytes())?;
        report("alice", &msg, &alice.receive_message(&msg)?);
    }

    tracing::info!("=== replay ===");
    let replayed = alice.send_message(&bob_id, b"Bob I really need you PLZ")?;
    report("bob", &replayed, &bob.receive_message(&replayed)?);
    match bob.receive_message(&replayed) {
        Ok(plaintext) => {
            let text = String::from_utf8_lossy(&plaintext);
            tracing::warn!(%text, "[bob] replay accepted from cached key");
        },
        Err(err) => tracing::info!(%err, "[bob] replay rejected"),
    }

    tracing::info!("=== teardown ===");
    alice.end_session(&bob_id)?;
    bob.end_session(&alice_id)?;
    tracing::info!(
        alice_sessions = alice.session_count(),
        bob_sessions = bob.session_count(),
        "sessions ended"
    );

    Ok(())
}

/// Alice initiates, Bob answers, Alice finalizes; confirmations must agree.
fn handshake<E: Entropy>(
    alice: &mut Chatter<E>,
    bob: &mut Chatter<E>,
) -> Result<(), Box<dyn Error>> {
    let alice_id = *alice.identity();
    let bob_id = *bob.identity();

    let alice_ephemeral = alice.initiate_handshake(&bob_id)?;
    let (bob_ephemeral, bob_confirm) = bob.return_handshake(&alice_id, &alice_ephemeral)?;
    let alice_confirm = alice.finalize_handshake(&bob_id, &bob_ephemeral)?;

    if alice_confirm != bob_confirm {
        return Err("handshake confirmation values differ".into());
    }

    tracing::info!("handshake complete, confirmation values match");
    Ok(())
}

fn report(who: &str, msg: &Message, plaintext: &[u8]) {
    tracing::info!(
        counter = msg.counter,
        text = %String::from_utf8_lossy(plaintext),
        "[{who}] decrypted"
    );
}
