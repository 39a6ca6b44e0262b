//! # Shroud Transport
//!
//! Packet plumbing for the Shroud covert messaging protocol.
//!
//! This crate provides:
//! - A minimal IPv4/ICMP/UDP packet builder and zero-copy parser
//! - [`Carrier`] strategies that hide fragment envelopes in IP options or
//!   ICMP message bodies
//! - The blocking [`RawTransport`] trait with a raw socket backend and an
//!   in-memory channel backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod carrier;
pub mod channel;
pub mod packet;
pub mod raw;
pub mod transport;

pub use carrier::Carrier;
pub use channel::{ChannelNetwork, ChannelTransport};
pub use packet::PacketError;
pub use raw::{RawSocket, bind_dummy_listener};
pub use transport::{RawTransport, TransportError, TransportResult};
