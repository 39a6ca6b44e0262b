//! Two-peer test fixture
//!
//! Wires two [`Messager`]s together over an in-memory [`ChannelNetwork`] so
//! sessions can be exercised without raw sockets or privileges.
//!
//! # Example
//!
//! ```no_run
//! use shroud_integration_tests::fixtures::TwoPeerFixture;
//!
//! let mut fixture = TwoPeerFixture::new();
//! fixture.alice.send(fixture.bob_addr, b"hi").unwrap();
//! let delivered = fixture.deliver_to_bob();
//! assert_eq!(delivered[0].payload.as_ref().unwrap(), b"hi");
//! ```

use shroud_core::{Inbound, Messager, SessionConfig};
use shroud_crypto::Secret;
use shroud_transport::{ChannelNetwork, ChannelTransport, RawTransport};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Shared secret used unless a test supplies its own
pub const TEST_SECRET: [u8; 32] = [0x5a; 32];

/// Sender id of the first peer
pub const ALICE_ID: u16 = 0x0a11;

/// Sender id of the second peer
pub const BOB_ID: u16 = 0x0b0b;

/// How long [`pump`] waits for a further packet before giving up
const PUMP_TIMEOUT: Duration = Duration::from_millis(25);

/// Two sessions attached to the same in-memory network
pub struct TwoPeerFixture {
    pub alice: Messager<ChannelTransport>,
    pub bob: Messager<ChannelTransport>,
    pub alice_addr: IpAddr,
    pub bob_addr: IpAddr,
    pub network: ChannelNetwork,
}

impl TwoPeerFixture {
    /// Two peers with default sessions and a shared secret
    pub fn new() -> Self {
        Self::with_configs(SessionConfig::new(ALICE_ID), SessionConfig::new(BOB_ID))
    }

    /// Two peers with custom session configurations and a shared secret
    pub fn with_configs(alice: SessionConfig, bob: SessionConfig) -> Self {
        Self::with_configs_and_secrets(alice, bob, TEST_SECRET, TEST_SECRET)
    }

    /// Two peers with default sessions and independent secrets
    pub fn with_secrets(alice: [u8; 32], bob: [u8; 32]) -> Self {
        Self::with_configs_and_secrets(
            SessionConfig::new(ALICE_ID),
            SessionConfig::new(BOB_ID),
            alice,
            bob,
        )
    }

    /// Two peers with custom configurations and secrets
    pub fn with_configs_and_secrets(
        alice_config: SessionConfig,
        bob_config: SessionConfig,
        alice_secret: [u8; 32],
        bob_secret: [u8; 32],
    ) -> Self {
        let alice_addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let bob_addr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2));
        let network = ChannelNetwork::new();

        let alice = Messager::new(
            alice_config,
            Secret::new(alice_secret),
            network.attach(alice_addr),
        )
        .expect("alice session");
        let bob = Messager::new(bob_config, Secret::new(bob_secret), network.attach(bob_addr))
            .expect("bob session");

        Self {
            alice,
            bob,
            alice_addr,
            bob_addr,
            network,
        }
    }

    /// Process everything queued for bob
    pub fn deliver_to_bob(&mut self) -> Vec<Inbound> {
        pump(&mut self.bob)
    }

    /// Process everything queued for alice
    pub fn deliver_to_alice(&mut self) -> Vec<Inbound> {
        pump(&mut self.alice)
    }

    /// Attach a third session to the same network
    pub fn attach_peer(&self, addr: IpAddr, config: SessionConfig) -> Messager<ChannelTransport> {
        Messager::new(config, Secret::new(TEST_SECRET), self.network.attach(addr))
            .expect("third session")
    }
}

impl Default for TwoPeerFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed every queued packet through `messager`, returning completed
/// transmissions in order.
///
/// Stops once no packet arrives within a short timeout. Leaves that
/// timeout configured on the transport.
pub fn pump(messager: &mut Messager<ChannelTransport>) -> Vec<Inbound> {
    messager
        .transport()
        .set_read_timeout(Some(PUMP_TIMEOUT))
        .expect("set read timeout");

    let mut buf = vec![0u8; messager.config().recv_buffer_size];
    let mut delivered = Vec::new();
    while let Ok((len, peer)) = messager.transport().recv_from(&mut buf) {
        delivered.extend(messager.handle_packet(&buf[..len], peer));
    }
    delivered
}
