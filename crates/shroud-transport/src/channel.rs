//! In-memory transport.
//!
//! A [`ChannelNetwork`] routes packets between attached [`ChannelTransport`]s
//! by IP address over `crossbeam-channel` queues. Packets to addresses
//! nobody attached are dropped, as a real network would.

use crate::transport::{RawTransport, TransportError, TransportResult, check_timeout};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

type Datagram = (Vec<u8>, IpAddr);
type Routes = Arc<Mutex<HashMap<IpAddr, Route>>>;

struct Route {
    endpoint: u64,
    tx: Sender<Datagram>,
}

/// Shared routing table for in-memory transports
#[derive(Clone, Default)]
pub struct ChannelNetwork {
    routes: Routes,
    next_endpoint: Arc<AtomicU64>,
}

impl ChannelNetwork {
    /// Create an empty network
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a transport reachable at `addr`.
    ///
    /// Attaching an address twice replaces the earlier endpoint, which then
    /// stops receiving.
    #[must_use]
    pub fn attach(&self, addr: IpAddr) -> ChannelTransport {
        let (tx, rx) = unbounded();
        let endpoint = self.next_endpoint.fetch_add(1, Ordering::Relaxed);
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, Route { endpoint, tx });

        ChannelTransport {
            local: addr,
            endpoint,
            routes: Arc::clone(&self.routes),
            rx,
            read_timeout: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }
}

/// In-memory endpoint of a [`ChannelNetwork`]
pub struct ChannelTransport {
    local: IpAddr,
    endpoint: u64,
    routes: Routes,
    rx: Receiver<Datagram>,
    read_timeout: Mutex<Option<Duration>>,
    closed: AtomicBool,
}

impl ChannelTransport {
    /// Create two endpoints that can reach each other.
    #[must_use]
    pub fn pair(a: IpAddr, b: IpAddr) -> (Self, Self) {
        let network = ChannelNetwork::new();
        (network.attach(a), network.attach(b))
    }

    /// Address this endpoint is reachable at
    #[must_use]
    pub fn local_addr(&self) -> IpAddr {
        self.local
    }

    fn route(&self, target: IpAddr) -> Option<Sender<Datagram>> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
            .map(|route| route.tx.clone())
    }
}

impl RawTransport for ChannelTransport {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> TransportResult<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match self.route(target) {
            Some(tx) if tx.send((packet.to_vec(), self.local)).is_ok() => {}
            _ => trace!(%target, "no route, packet dropped"),
        }
        Ok(packet.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, IpAddr)> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let timeout = *self
            .read_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (packet, peer) = match timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => TransportError::Timeout,
                RecvTimeoutError::Disconnected => TransportError::Closed,
            })?,
            None => self.rx.recv().map_err(|_| TransportError::Closed)?,
        };

        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        // Datagram semantics: excess bytes are truncated.
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok((len, peer))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> TransportResult<()> {
        check_timeout(timeout)?;
        *self
            .read_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = timeout;
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping our route disconnects the queue and wakes a blocked reader.
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes
            .get(&self.local)
            .is_some_and(|route| route.endpoint == self.endpoint)
        {
            routes.remove(&self.local);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread;

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    const C: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));

    #[test]
    fn test_pair_delivers_with_source() {
        let (a, b) = ChannelTransport::pair(A, B);
        assert_eq!(a.send_to(b"ping", B).unwrap(), 4);

        let mut buf = [0u8; 64];
        let (len, peer) = b.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(peer, A);
    }

    #[test]
    fn test_unknown_target_dropped() {
        let (a, b) = ChannelTransport::pair(A, B);
        assert_eq!(a.send_to(b"lost", C).unwrap(), 4);

        b.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let mut buf = [0u8; 64];
        assert!(b.recv_from(&mut buf).unwrap_err().is_timeout());
    }

    #[test]
    fn test_network_routes_by_address() {
        let network = ChannelNetwork::new();
        let a = network.attach(A);
        let b = network.attach(B);
        let c = network.attach(C);

        b.send_to(b"from b", A).unwrap();
        c.send_to(b"from c", A).unwrap();

        let mut buf = [0u8; 64];
        let (len, peer) = a.recv_from(&mut buf).unwrap();
        assert_eq!((&buf[..len], peer), (&b"from b"[..], B));
        let (len, peer) = a.recv_from(&mut buf).unwrap();
        assert_eq!((&buf[..len], peer), (&b"from c"[..], C));
    }

    #[test]
    fn test_truncates_to_buffer() {
        let (a, b) = ChannelTransport::pair(A, B);
        a.send_to(&[7u8; 32], B).unwrap();

        let mut buf = [0u8; 8];
        let (len, _) = b.recv_from(&mut buf).unwrap();
        assert_eq!(len, 8);
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (a, b) = ChannelTransport::pair(A, B);
        let b = Arc::new(b);

        let reader = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                b.recv_from(&mut buf)
            })
        };

        thread::sleep(Duration::from_millis(20));
        b.close();
        let result = reader.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));

        assert!(b.is_closed());
        assert!(matches!(b.send_to(b"x", A), Err(TransportError::Closed)));
        // Sending to a closed peer is silently dropped.
        assert!(a.send_to(b"x", B).is_ok());
    }

    #[test]
    fn test_reattach_keeps_new_route() {
        let network = ChannelNetwork::new();
        let old = network.attach(B);
        let new = network.attach(B);
        let a = network.attach(A);

        old.close();
        a.send_to(b"hi", B).unwrap();

        let mut buf = [0u8; 8];
        let (len, _) = new.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hi");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let (a, _b) = ChannelTransport::pair(A, B);
        assert!(matches!(
            a.set_read_timeout(Some(Duration::ZERO)),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
