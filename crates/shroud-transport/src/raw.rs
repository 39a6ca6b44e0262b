//! Raw IPv4 socket transport.
//!
//! Sends hand-built packets with `IP_HDRINCL` and reads whole datagrams,
//! IPv4 header included. Opening a raw socket needs `CAP_NET_RAW` (or root).

use crate::carrier::{Carrier, DUMMY_UDP_PORT};
use crate::packet::Ipv4Packet;
use crate::transport::{RawTransport, TransportError, TransportResult, check_timeout};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Raw IPv4 socket bound to one IP protocol
pub struct RawSocket {
    socket: Socket,
    protocol: u8,
    closed: AtomicBool,
}

impl RawSocket {
    /// Open a raw socket for the protocol `carrier` travels on.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the socket cannot be created, which
    /// usually means the process lacks raw socket privileges.
    pub fn open(carrier: Carrier) -> TransportResult<Self> {
        Self::with_protocol(carrier.ip_protocol())
    }

    /// Open a raw socket for an arbitrary IP protocol number.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the socket cannot be created.
    pub fn with_protocol(protocol: u8) -> TransportResult<Self> {
        let socket = Socket::new(
            Domain::IPV4,
            Type::RAW,
            Some(Protocol::from(i32::from(protocol))),
        )?;
        // Outgoing packets carry their own IPv4 header
        socket.set_header_included_v4(true)?;

        debug!(protocol, "opened raw socket");
        Ok(Self {
            socket,
            protocol,
            closed: AtomicBool::new(false),
        })
    }

    /// IP protocol number this socket sends and receives
    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Set the kernel receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the option cannot be applied.
    pub fn set_recv_buffer_size(&self, size: usize) -> TransportResult<()> {
        self.socket.set_recv_buffer_size(size)?;
        Ok(())
    }
}

impl RawTransport for RawSocket {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> TransportResult<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let IpAddr::V4(ip) = target else {
            return Err(TransportError::UnsupportedAddress(target));
        };
        let addr = SockAddr::from(SocketAddrV4::new(ip, 0));
        Ok(self.socket.send_to(packet, &addr)?)
    }

    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, IpAddr)> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let len = (&self.socket).read(buf).map_err(TransportError::from_read)?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        // Raw IPv4 reads include the header; the peer is its source field.
        let peer = Ipv4Packet::parse(&buf[..len])
            .map(|packet| packet.source())
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        Ok((len, IpAddr::V4(peer)))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> TransportResult<()> {
        check_timeout(timeout)?;
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            // Unconnected raw sockets may refuse; readers notice the flag
            // at their next wakeup.
            debug!(error = %e, "raw socket shutdown");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Bind an ordinary UDP socket on the dummy carrier port.
///
/// Holding the port open stops the kernel answering IP-option packets with
/// ICMP port-unreachable. Nothing is ever read from it.
///
/// # Errors
///
/// Returns an I/O error if the port cannot be bound.
pub fn bind_dummy_listener() -> io::Result<UdpSocket> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, DUMMY_UDP_PORT));
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}
