//! # Shroud Crypto
//!
//! Cryptographic primitives for the Shroud covert messaging protocol.
//!
//! This crate provides:
//! - `ChaCha20-Poly1305` AEAD encryption keyed by a pre-shared [`Secret`]
//! - Per-message random nonces
//! - Transmission-bound associated data
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | AEAD | ChaCha20-Poly1305 | 256-bit key |
//! | Nonce | 96-bit random, one per message | N/A |
//! | Tag | Poly1305 | 128-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod error;
pub mod random;

pub use aead::{KEY_SIZE, NONCE_SIZE, Nonce, Secret, TAG_SIZE, transmission_aad};
pub use error::CryptoError;

/// Associated data size (transmission id zero-extended to 32 bits)
pub const AAD_SIZE: usize = 4;
