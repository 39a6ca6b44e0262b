//! Test fixtures.

mod two_peer;

pub use two_peer::{TEST_SECRET, TwoPeerFixture, pump};
