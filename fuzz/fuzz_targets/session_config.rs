//! Fuzz target for session configuration parsing
//!
//! Tests that arbitrary TOML never panics the config loader or validator.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_core::SessionConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<SessionConfig>(s) {
            let _ = config.validate();
        }
    }
});
