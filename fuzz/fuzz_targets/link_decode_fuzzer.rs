//! Fuzz target for link decoding
//!
//! Links arrive from the ledger as CBOR. Decoding must reject malformed
//! input with an error, never a panic.
//!
//! # Invariants
//!
//! - `Link::decode` never panics
//! - A decoded link re-encodes, and the re-encoding decodes to the same link
//! - A decoded link has a stable id

#![no_main]

use libfuzzer_sys::fuzz_target;
use rekey_core::Link;

fuzz_target!(|data: &[u8]| {
    let Ok(link) = Link::decode(data) else {
        return;
    };

    let encoded = link.encode().expect("decoded link must re-encode");
    let again = Link::decode(&encoded).expect("re-encoded link must decode");
    assert_eq!(again, link);
    assert_eq!(again.id().ok(), link.id().ok());
});
