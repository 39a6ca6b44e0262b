//! Minimal IPv4, ICMP and UDP packet construction and parsing.
//!
//! Only what the carriers need: an IPv4 header with options and a valid
//! header checksum, ICMP messages with their checksum, and a bare UDP header.
//! Parsing is zero-copy and borrows from the received buffer.

use std::net::Ipv4Addr;
use thiserror::Error;

/// IPv4 header length without options.
pub const IPV4_HEADER_LEN: usize = 20;

/// Maximum IPv4 options length (IHL of 15 words).
pub const MAX_OPTIONS_LEN: usize = 40;

/// ICMP header length (type, code, checksum, rest-of-header).
pub const ICMP_HEADER_LEN: usize = 8;

/// UDP header length.
pub const UDP_HEADER_LEN: usize = 8;

/// IP protocol number for ICMP.
pub const PROTO_ICMP: u8 = 1;

/// IP protocol number for UDP.
pub const PROTO_UDP: u8 = 17;

/// Largest IPv4 datagram.
pub const MAX_PACKET_LEN: usize = 65535;

const DEFAULT_TTL: u8 = 64;

/// Packet construction and parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the structure it should hold
    #[error("packet too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Minimum length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Version nibble is not 4
    #[error("not an IPv4 packet (version {0})")]
    NotIpv4(u8),

    /// IHL below 5 or beyond the buffer
    #[error("invalid IPv4 header length: {0} words")]
    InvalidHeaderLength(u8),

    /// Options do not fit in the IPv4 header
    #[error("IPv4 options too long: {0} bytes (max 40)")]
    OptionsTooLong(usize),

    /// Datagram larger than 65535 bytes
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
}

/// Compute the Internet checksum (RFC 1071) over `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// IPv4 packet builder.
///
/// Options are zero-padded (End of Option List) to a 4-byte boundary.
/// A source of `0.0.0.0` lets the kernel fill in the outgoing address.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: u8,
    options: Vec<u8>,
}

impl Ipv4Builder {
    /// Create a builder for a packet to `destination` carrying `protocol`.
    #[must_use]
    pub fn new(destination: Ipv4Addr, protocol: u8) -> Self {
        Self {
            source: Ipv4Addr::UNSPECIFIED,
            destination,
            protocol,
            options: Vec::new(),
        }
    }

    /// Set the source address
    #[must_use]
    pub fn source(mut self, source: Ipv4Addr) -> Self {
        self.source = source;
        self
    }

    /// Set the raw options bytes
    #[must_use]
    pub fn options(mut self, options: &[u8]) -> Self {
        self.options = options.to_vec();
        self
    }

    /// Build the packet around `payload`.
    ///
    /// # Errors
    ///
    /// Returns `PacketError::OptionsTooLong` if the options exceed 40 bytes
    /// and `PacketError::TooLarge` if the datagram exceeds 65535 bytes.
    pub fn build(&self, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
        if self.options.len() > MAX_OPTIONS_LEN {
            return Err(PacketError::OptionsTooLong(self.options.len()));
        }
        let options_len = self.options.len().div_ceil(4) * 4;
        let header_len = IPV4_HEADER_LEN + options_len;
        let total_len = header_len + payload.len();
        if total_len > MAX_PACKET_LEN {
            return Err(PacketError::TooLarge(total_len));
        }

        let mut packet = Vec::with_capacity(total_len);
        packet.push(0x40 | (header_len / 4) as u8); // version 4, IHL
        packet.push(0); // DSCP/ECN
        packet.extend_from_slice(&(total_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0, 0]); // identification
        packet.extend_from_slice(&[0, 0]); // flags, fragment offset
        packet.push(DEFAULT_TTL);
        packet.push(self.protocol);
        packet.extend_from_slice(&[0, 0]); // checksum placeholder
        packet.extend_from_slice(&self.source.octets());
        packet.extend_from_slice(&self.destination.octets());
        packet.extend_from_slice(&self.options);
        packet.resize(header_len, 0);

        let sum = checksum(&packet[..header_len]);
        packet[10..12].copy_from_slice(&sum.to_be_bytes());

        packet.extend_from_slice(payload);
        Ok(packet)
    }
}

/// Parsed IPv4 packet (zero-copy)
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Packet<'a> {
    header: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    /// Parse an IPv4 packet.
    ///
    /// The payload ends at the total-length field when it is consistent with
    /// the buffer, otherwise at the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns `PacketError` if the buffer is not a well-formed IPv4 header.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(PacketError::TooShort {
                expected: IPV4_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = data[0] >> 4;
        if version != 4 {
            return Err(PacketError::NotIpv4(version));
        }

        let ihl = data[0] & 0x0f;
        let header_len = usize::from(ihl) * 4;
        if ihl < 5 || header_len > data.len() {
            return Err(PacketError::InvalidHeaderLength(ihl));
        }

        let total_len = usize::from(u16::from_be_bytes([data[2], data[3]]));
        let end = if (header_len..=data.len()).contains(&total_len) {
            total_len
        } else {
            data.len()
        };

        Ok(Self {
            header: &data[..header_len],
            payload: &data[header_len..end],
        })
    }

    /// Source address
    #[must_use]
    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[12], self.header[13], self.header[14], self.header[15])
    }

    /// Destination address
    #[must_use]
    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[16], self.header[17], self.header[18], self.header[19])
    }

    /// Protocol number of the payload
    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.header[9]
    }

    /// Raw options bytes, including any trailing padding
    #[must_use]
    pub fn options(&self) -> &'a [u8] {
        &self.header[IPV4_HEADER_LEN..]
    }

    /// Bytes following the header
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Whether the stored header checksum verifies.
    ///
    /// Kernels may leave the field zero on locally delivered packets, so
    /// parsing does not enforce it.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        checksum(self.header) == 0
    }
}

/// Build an ICMP message with its checksum filled in.
#[must_use]
pub fn build_icmp(icmp_type: u8, code: u8, rest: [u8; 4], body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(ICMP_HEADER_LEN + body.len());
    message.push(icmp_type);
    message.push(code);
    message.extend_from_slice(&[0, 0]);
    message.extend_from_slice(&rest);
    message.extend_from_slice(body);

    let sum = checksum(&message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    message
}

/// Parsed ICMP message (zero-copy)
#[derive(Debug, Clone, Copy)]
pub struct IcmpMessage<'a> {
    data: &'a [u8],
}

impl<'a> IcmpMessage<'a> {
    /// Parse an ICMP message.
    ///
    /// # Errors
    ///
    /// Returns `PacketError::TooShort` if the buffer holds no full header.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(PacketError::TooShort {
                expected: ICMP_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    /// ICMP type
    #[must_use]
    pub fn icmp_type(&self) -> u8 {
        self.data[0]
    }

    /// ICMP code
    #[must_use]
    pub fn code(&self) -> u8 {
        self.data[1]
    }

    /// Rest-of-header word
    #[must_use]
    pub fn rest(&self) -> [u8; 4] {
        [self.data[4], self.data[5], self.data[6], self.data[7]]
    }

    /// Message body
    #[must_use]
    pub fn body(&self) -> &'a [u8] {
        &self.data[ICMP_HEADER_LEN..]
    }

    /// Whether the message checksum verifies
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        checksum(self.data) == 0
    }
}

/// Build a UDP header with no payload and a zero (disabled) checksum.
#[must_use]
pub fn build_udp_header(source_port: u16, destination_port: u16) -> [u8; UDP_HEADER_LEN] {
    let mut header = [0u8; UDP_HEADER_LEN];
    header[0..2].copy_from_slice(&source_port.to_be_bytes());
    header[2..4].copy_from_slice(&destination_port.to_be_bytes());
    header[4..6].copy_from_slice(&(UDP_HEADER_LEN as u16).to_be_bytes());
    header
}
