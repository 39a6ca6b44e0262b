//! Fuzz target for message reconstruction
//!
//! Decodes arbitrary fragment sets; decoding must fail cleanly, never panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shroud_core::frame::Fragment;
use shroud_core::shifter;
use shroud_crypto::Secret;

#[derive(Debug, Arbitrary)]
struct DecodeInput {
    key: [u8; 32],
    envelopes: Vec<Vec<u8>>,
}

fuzz_target!(|input: DecodeInput| {
    let fragments: Vec<Fragment> = input
        .envelopes
        .iter()
        .filter_map(|envelope| Fragment::parse(envelope).ok())
        .collect();

    let _ = shifter::decode(&fragments, &Secret::new(input.key));
});
