//! Fuzz target for fragment parsing
//!
//! Tests that the fragment parser handles arbitrary envelopes without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::frame::{Fragment, FrameHeader};

fuzz_target!(|data: &[u8]| {
    let _ = FrameHeader::decode(data);

    // A parsed fragment must re-encode to the bytes it was read from
    if let Ok(fragment) = Fragment::parse(data) {
        let envelope = fragment.to_envelope();
        assert_eq!(&data[..envelope.len()], &envelope[..]);
    }
});
