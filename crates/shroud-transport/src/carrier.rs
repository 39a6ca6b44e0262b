//! Carrier strategies.
//!
//! A carrier decides which packet field smuggles a fragment envelope (the
//! 4-byte fragment header followed by its payload). Every carrier can wrap an
//! envelope into a complete IPv4 packet and unwrap one back out, rejecting
//! packets that belong to a different carrier.

use crate::packet::{
    IPV4_HEADER_LEN, IcmpMessage, Ipv4Builder, Ipv4Packet, MAX_OPTIONS_LEN, MAX_PACKET_LEN,
    ICMP_HEADER_LEN, PROTO_ICMP, PROTO_UDP, build_icmp, build_udp_header,
};
use crate::transport::{TransportError, TransportResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// IP option type used for the envelope (copy 0, class 2, number 4: timestamp).
pub const IP_OPTION_TYPE: u8 = 0x44;

/// Option type, length, pointer and flags bytes preceding the envelope.
pub const OPTION_HEADER_LEN: usize = 4;

/// Source and destination port of the dummy UDP header.
pub const DUMMY_UDP_PORT: u16 = 8521;

/// ICMP destination unreachable.
pub const ICMP_DEST_UNREACHABLE: u8 = 3;

/// ICMP host unreachable code.
pub const ICMP_HOST_UNREACHABLE: u8 = 1;

/// ICMP echo reply.
pub const ICMP_ECHO_REPLY: u8 = 0;

/// ICMP echo request.
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// Packet field used to carry fragment envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Carrier {
    /// Timestamp-style IPv4 option on a packet with a dummy UDP header
    #[default]
    IpOption,
    /// Body of an ICMP destination-unreachable message
    IcmpUnreachable,
    /// Body of an ICMP echo reply
    IcmpEcho,
}

impl Carrier {
    /// All carriers
    pub const ALL: [Carrier; 3] = [Self::IpOption, Self::IcmpUnreachable, Self::IcmpEcho];

    /// IP protocol a raw socket must be opened with to send and receive
    /// this carrier's packets.
    #[must_use]
    pub const fn ip_protocol(self) -> u8 {
        match self {
            Self::IpOption => PROTO_UDP,
            Self::IcmpUnreachable | Self::IcmpEcho => PROTO_ICMP,
        }
    }

    /// Largest envelope this carrier can hold.
    #[must_use]
    pub const fn max_envelope_len(self) -> usize {
        match self {
            Self::IpOption => MAX_OPTIONS_LEN - OPTION_HEADER_LEN,
            Self::IcmpUnreachable | Self::IcmpEcho => {
                MAX_PACKET_LEN - IPV4_HEADER_LEN - ICMP_HEADER_LEN
            }
        }
    }

    /// Configuration name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IpOption => "ip-option",
            Self::IcmpUnreachable => "icmp-unreachable",
            Self::IcmpEcho => "icmp-echo",
        }
    }

    /// Embed `envelope` in a complete IPv4 packet addressed to `target`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::UnsupportedAddress` for IPv6 targets and
    /// `TransportError::Packet` if the envelope does not fit the carrier.
    pub fn wrap(self, target: IpAddr, envelope: &[u8]) -> TransportResult<Vec<u8>> {
        let IpAddr::V4(destination) = target else {
            return Err(TransportError::UnsupportedAddress(target));
        };

        let packet = match self {
            Self::IpOption => {
                let option = ip_option(envelope);
                Ipv4Builder::new(destination, PROTO_UDP)
                    .options(&option)
                    .build(&build_udp_header(DUMMY_UDP_PORT, DUMMY_UDP_PORT))?
            }
            Self::IcmpUnreachable => icmp_packet(
                destination,
                ICMP_DEST_UNREACHABLE,
                ICMP_HOST_UNREACHABLE,
                envelope,
            )?,
            Self::IcmpEcho => icmp_packet(destination, ICMP_ECHO_REPLY, 0, envelope)?,
        };
        Ok(packet)
    }

    /// Extract the envelope from a received IPv4 packet.
    ///
    /// Returns `None` for packets that are malformed or belong to another
    /// carrier. The returned slice may extend past the envelope; the
    /// fragment header's declared length bounds it.
    #[must_use]
    pub fn unwrap<'a>(self, packet: &'a [u8]) -> Option<&'a [u8]> {
        let ip = Ipv4Packet::parse(packet).ok()?;
        if ip.protocol() != self.ip_protocol() {
            return None;
        }

        match self {
            Self::IpOption => {
                let options = ip.options();
                if options.first() != Some(&IP_OPTION_TYPE) {
                    return None;
                }
                let length = usize::from(*options.get(1)?);
                if length < OPTION_HEADER_LEN || length > options.len() {
                    return None;
                }
                Some(&options[OPTION_HEADER_LEN..length])
            }
            Self::IcmpUnreachable => {
                let icmp = IcmpMessage::parse(ip.payload()).ok()?;
                (icmp.icmp_type() == ICMP_DEST_UNREACHABLE
                    && icmp.code() == ICMP_HOST_UNREACHABLE)
                    .then_some(icmp.body())
            }
            Self::IcmpEcho => {
                let icmp = IcmpMessage::parse(ip.payload()).ok()?;
                matches!(icmp.icmp_type(), ICMP_ECHO_REPLY | ICMP_ECHO_REQUEST)
                    .then_some(icmp.body())
            }
        }
    }
}

/// Timestamp-style option: type, length, pointer (one past the end), flags.
fn ip_option(envelope: &[u8]) -> Vec<u8> {
    let length = OPTION_HEADER_LEN + envelope.len();
    let mut option = Vec::with_capacity(length);
    option.push(IP_OPTION_TYPE);
    option.push(length as u8);
    option.push(length.wrapping_add(1) as u8);
    option.push(0x00);
    option.extend_from_slice(envelope);
    option
}

fn icmp_packet(
    destination: Ipv4Addr,
    icmp_type: u8,
    code: u8,
    envelope: &[u8],
) -> TransportResult<Vec<u8>> {
    let message = build_icmp(icmp_type, code, [0; 4], envelope);
    Ok(Ipv4Builder::new(destination, PROTO_ICMP).build(&message)?)
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Carrier {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|carrier| carrier.as_str() == s)
            .ok_or_else(|| TransportError::InvalidConfig(format!("unknown carrier: {s}")))
    }
}
