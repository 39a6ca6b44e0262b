//! Fuzz target for carrier unwrapping
//!
//! Feeds arbitrary packets to every carrier and the receive path behind it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::frame::Fragment;
use shroud_transport::Carrier;

fuzz_target!(|data: &[u8]| {
    for carrier in Carrier::ALL {
        if let Some(envelope) = carrier.unwrap(data) {
            let _ = Fragment::parse(envelope);
        }
    }
});
