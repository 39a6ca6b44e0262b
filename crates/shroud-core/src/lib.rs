//! # Shroud Core
//!
//! Core protocol implementation for Shroud, covert authenticated messaging
//! carried in IP option and ICMP packet fields.
//!
//! This crate provides:
//! - Fragment header encoding and decoding
//! - The shifter: encryption plus fragmentation, and the reverse
//! - Reassembly of in-flight transmissions with idle expiry
//! - Blocking messaging sessions over any [`RawTransport`]
//! - Payload schemas for typed messages
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Messager                                 │
//! │   (send loop, receive loop, reassembly cache, statistics)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Shifter                                  │
//! │   (ChaCha20-Poly1305, nonce + ciphertext fragmentation)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Fragments                                │
//! │   (4-byte header, padded chunk, hidden by a Carrier)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shroud_core::{Messager, SessionConfig};
//! use shroud_crypto::Secret;
//! use shroud_transport::ChannelTransport;
//!
//! let (a, b) = ChannelTransport::pair("10.0.0.1".parse()?, "10.0.0.2".parse()?);
//! let secret = [7u8; 32];
//! let alice = Messager::new(SessionConfig::new(1), Secret::new(secret), a)?;
//! let mut bob = Messager::new(SessionConfig::new(2), Secret::new(secret), b)?;
//!
//! alice.send("10.0.0.2".parse()?, b"hello")?;
//! bob.receive(|inbound| println!("{:?}", inbound.payload))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`RawTransport`]: shroud_transport::RawTransport

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod reassembly;
pub mod schema;
pub mod session;
pub mod shifter;

pub use error::{ConfigError, Error, FrameError, Result, SchemaError};
pub use frame::{Fragment, FragmentType, FrameHeader};
pub use reassembly::{Admission, DiscardReason, ReassemblyCache, TransmissionKey};
pub use schema::{JsonSchema, Message, PayloadSchema, RawSchema, TextSchema};
pub use session::{
    Inbound, MessageSender, Messager, SessionConfig, SessionStats, ShutdownHandle,
};
pub use shifter::FragmentSize;

/// Fragment header size in bytes
pub const FRAGMENT_HEADER_SIZE: usize = frame::HEADER_SIZE;

/// Default idle expiry for open transmissions
pub const CLEAN_TIME: std::time::Duration = session::DEFAULT_SWEEP_INTERVAL;
