//! Raw transport abstraction.
//!
//! A `RawTransport` moves whole IPv4 packets (header included) between this
//! host and a peer address. Two backends implement it: [`RawSocket`] for the
//! network and [`ChannelTransport`] for in-process peers.
//!
//! [`RawSocket`]: crate::raw::RawSocket
//! [`ChannelTransport`]: crate::channel::ChannelTransport

use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read timed out before any packet arrived
    #[error("Read timed out")]
    Timeout,

    /// Transport is closed
    #[error("Transport is closed")]
    Closed,

    /// Address family or address not supported by this transport
    #[error("Unsupported address: {0}")]
    UnsupportedAddress(IpAddr),

    /// Packet could not be built
    #[error("Packet construction failed: {0}")]
    Packet(#[from] crate::packet::PacketError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Whether the error is a read timeout rather than a failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Map an I/O error, folding the platform timeout kinds into `Timeout`.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(err),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Blocking packet transport.
///
/// Implementations are shared between a receive loop and any number of
/// senders, so every method takes `&self`.
pub trait RawTransport: Send + Sync {
    /// Send one complete IPv4 packet to `target`.
    ///
    /// # Errors
    /// Returns `TransportError` if the packet cannot be handed to the network.
    fn send_to(&self, packet: &[u8], target: IpAddr) -> TransportResult<usize>;

    /// Block until a packet arrives.
    ///
    /// Fills `buf` with the packet (IPv4 header included) and returns its
    /// length together with the sender's address.
    ///
    /// # Errors
    /// Returns `TransportError::Timeout` when a configured read timeout
    /// elapses and `TransportError::Closed` once the transport is closed.
    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, IpAddr)>;

    /// Set or clear the read timeout used by `recv_from`.
    ///
    /// # Errors
    /// Returns `TransportError::InvalidConfig` for a zero duration.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> TransportResult<()>;

    /// Close the transport. Subsequent reads return `TransportError::Closed`.
    fn close(&self);

    /// Check if the transport is closed.
    fn is_closed(&self) -> bool;
}

pub(crate) fn check_timeout(timeout: Option<Duration>) -> TransportResult<()> {
    if timeout == Some(Duration::ZERO) {
        return Err(TransportError::InvalidConfig(
            "read timeout must be non-zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_errors_fold_timeouts() {
        let err = TransportError::from_read(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_timeout());

        let err = TransportError::from_read(io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_timeout());

        let err = TransportError::from_read(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, TransportError::Io(_)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(check_timeout(Some(Duration::ZERO)).is_err());
        assert!(check_timeout(Some(Duration::from_millis(1))).is_ok());
        assert!(check_timeout(None).is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::UnsupportedAddress("::1".parse().unwrap());
        assert_eq!(err.to_string(), "Unsupported address: ::1");
        assert_eq!(TransportError::Closed.to_string(), "Transport is closed");
    }
}
