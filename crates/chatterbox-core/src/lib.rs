//! Chatterbox Session Engine
//!
//! Asynchronous, forward-secret messaging between two parties: a triple
//! Diffie-Hellman handshake seeds a root key, and a double ratchet derives a
//! fresh key for every message while tolerating out-of-order delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Chatter / SharedChatter                                 │
//! │   identity KeyPair + sessions by partner Fingerprint    │
//! ├──────────────────────┬──────────────────────────────────┤
//! │ handshake            │ ratchet::Session                 │
//! │   3 x DH → root key  │   root / send / receive chains   │
//! │   confirmation value │   skipped-key cache              │
//! ├──────────────────────┴──────────────────────────────────┤
//! │ message: header fields, 104-byte associated data, CBOR  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Message Flow
//!
//! ```text
//! Alice                                          Bob
//!   initiate_handshake(bob)   ── eph_A ──>
//!                             <── eph_B, ✓ ──    return_handshake(alice, eph_A)
//!   finalize_handshake(bob, eph_B) → ✓   (compare confirmation values)
//!   send_message(bob, m)      ── Message ──>     receive_message(msg) → m
//!                             <── Message ──     send_message(alice, r)  (DH step)
//! ```
//!
//! # Security
//!
//! - Every superseded chain key, message key and ratchet key pair is erased
//! - The header (counter, epoch marker, identities, ratchet key) is bound
//!   into the AEAD tag as associated data
//! - A peer cannot force more than [`ChatterConfig::max_skip`] chain steps or
//!   grow the skipped-key cache past [`ChatterConfig::max_cached_keys`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chatter;
pub mod config;
pub mod error;
mod handshake;
pub mod message;
pub mod ratchet;
pub mod shared;

pub use chatter::Chatter;
pub use config::{ChatterConfig, DEFAULT_MAX_CACHED_KEYS, DEFAULT_MAX_SKIP};
pub use error::ChatError;
pub use message::{ASSOCIATED_DATA_LENGTH, Message, encode_associated_data};
pub use ratchet::{
    CHAIN_LABEL, HANDSHAKE_CHECK_LABEL, KEY_LABEL, ROOT_LABEL, Session, chain_step, root_step,
};
pub use shared::SharedChatter;
