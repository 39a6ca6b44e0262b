//! Messaging sessions.
//!
//! A [`Messager`] binds a secret, a fragment size and a carrier to one
//! transport. Sending encrypts, fragments and transmits one packet per
//! fragment. Receiving runs a blocking loop that unwraps packets, feeds the
//! reassembly cache and hands every completed transmission to a callback.
//!
//! The receive loop owns the reassembly cache (`&mut self`); sending works
//! from any thread through a cloned [`MessageSender`].

use crate::error::{ConfigError, Error, Result};
use crate::frame::Fragment;
use crate::reassembly::{Admission, ReassemblyCache};
use crate::schema::{Message, PayloadSchema};
use crate::shifter::{self, FragmentSize};
use serde::{Deserialize, Serialize};
use shroud_crypto::Secret;
use shroud_transport::{Carrier, RawTransport, TransportError};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{Span, debug, info, info_span, trace, warn};

/// Smallest accepted receive buffer.
pub const MIN_RECV_BUFFER: usize = 128;

/// Default receive buffer (largest IPv4 datagram).
pub const DEFAULT_RECV_BUFFER: usize = 65535;

/// Default idle expiry and sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default reassembly cache capacity.
pub const DEFAULT_MAX_OPEN: usize = 1024;

/// Session configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Sender id, also the transmission id of everything this session sends
    pub sender_id: u16,
    /// Payload bytes per fragment
    pub bytes_per_fragment: FragmentSize,
    /// Packet field used to carry fragments
    pub carrier: Carrier,
    /// Idle expiry for open transmissions and minimum time between sweeps
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
    /// Read timeout for the receive loop; `None` blocks indefinitely
    #[serde(with = "opt_duration_secs", skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<Duration>,
    /// Receive buffer size in bytes
    pub recv_buffer_size: usize,
    /// Maximum number of transmissions reassembled at once
    pub max_open_transmissions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sender_id: 0,
            bytes_per_fragment: FragmentSize::DEFAULT,
            carrier: Carrier::IpOption,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            read_timeout: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER,
            max_open_transmissions: DEFAULT_MAX_OPEN,
        }
    }
}

impl SessionConfig {
    /// Default configuration for `sender_id`
    #[must_use]
    pub fn new(sender_id: u16) -> Self {
        Self {
            sender_id,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidSweepInterval);
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidReadTimeout);
        }
        if self.recv_buffer_size < MIN_RECV_BUFFER {
            return Err(ConfigError::InvalidRecvBuffer(self.recv_buffer_size));
        }
        if self.max_open_transmissions == 0 {
            return Err(ConfigError::InvalidMaxOpen);
        }
        Ok(())
    }
}

/// Cloneable flag that stops a receive loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Request shutdown.
    ///
    /// The loop notices at its next wakeup: a packet or a read timeout.
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Messages handed to the transport
    pub messages_sent: u64,
    /// Packets handed to the transport
    pub packets_sent: u64,
    /// Failed packet sends
    pub send_errors: u64,
    /// Packets read from the transport
    pub packets_received: u64,
    /// Packets dropped before reaching a bucket
    pub packets_discarded: u64,
    /// Messages delivered with a verified payload
    pub messages_delivered: u64,
    /// Completed transmissions that failed authentication
    pub verification_failures: u64,
    /// Completed transmissions that could not be decoded
    pub malformed_transmissions: u64,
    /// Buckets removed by the idle sweep
    pub expired_transmissions: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    messages_sent: AtomicU64,
    packets_sent: AtomicU64,
    send_errors: AtomicU64,
    packets_received: AtomicU64,
    packets_discarded: AtomicU64,
    messages_delivered: AtomicU64,
    verification_failures: AtomicU64,
    malformed_transmissions: AtomicU64,
    expired_transmissions: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            verification_failures: self.verification_failures.load(Ordering::Relaxed),
            malformed_transmissions: self.malformed_transmissions.load(Ordering::Relaxed),
            expired_transmissions: self.expired_transmissions.load(Ordering::Relaxed),
        }
    }
}

/// A completed transmission handed to the receive callback
#[derive(Debug)]
pub struct Inbound {
    /// Address the fragments came from
    pub peer: IpAddr,
    /// Transmission id (the remote sender id)
    pub transmission_id: u16,
    /// Decrypted payload, or `Error::VerificationFailed`
    pub payload: Result<Vec<u8>>,
}

impl Inbound {
    /// Whether the payload authenticated
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.payload.is_ok()
    }

    /// Parse the payload into a typed message addressed back to the peer.
    ///
    /// # Errors
    ///
    /// Returns `Error::VerificationFailed` for an unverified delivery and
    /// `Error::Schema` if the payload does not parse.
    pub fn parse_with<S: PayloadSchema>(&self, schema: &S) -> Result<Message<S::Item>> {
        let bytes = self
            .payload
            .as_ref()
            .map_err(|_| Error::VerificationFailed)?;
        let payload = schema.parse(bytes)?;
        Ok(Message::new(self.peer, self.transmission_id, payload))
    }
}

/// Sending half of a session, shareable across threads
pub struct MessageSender<T: RawTransport> {
    sender_id: u16,
    size: FragmentSize,
    carrier: Carrier,
    secret: Arc<Secret>,
    transport: Arc<T>,
    stats: Arc<StatsCounters>,
    span: Span,
}

impl<T: RawTransport> Clone for MessageSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender_id: self.sender_id,
            size: self.size,
            carrier: self.carrier,
            secret: Arc::clone(&self.secret),
            transport: Arc::clone(&self.transport),
            stats: Arc::clone(&self.stats),
            span: self.span.clone(),
        }
    }
}

impl<T: RawTransport> MessageSender<T> {
    /// Encrypt `payload` and transmit it to `target`, one packet per fragment.
    ///
    /// Delivery is not confirmed; only local failures are reported.
    /// Returns the number of packets sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Crypto` if encryption fails and `Error::Transport` if
    /// a packet cannot be built or handed to the transport.
    pub fn send(&self, target: IpAddr, payload: &[u8]) -> Result<usize> {
        let _enter = self.span.enter();

        let fragments = shifter::encode(payload, self.sender_id, &self.secret, self.size)?;
        for fragment in &fragments {
            if let Err(e) = self.transmit(target, fragment) {
                StatsCounters::bump(&self.stats.send_errors);
                warn!(%target, error = %e, "failed to send fragment");
                return Err(e.into());
            }
            StatsCounters::bump(&self.stats.packets_sent);
        }

        StatsCounters::bump(&self.stats.messages_sent);
        debug!(%target, len = payload.len(), packets = fragments.len(), "sent message");
        Ok(fragments.len())
    }

    /// Serialize a typed message and send it to `message.target`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Schema` if serialization fails, otherwise as
    /// [`MessageSender::send`].
    pub fn send_message<S: PayloadSchema>(
        &self,
        schema: &S,
        message: &Message<S::Item>,
    ) -> Result<usize> {
        let bytes = schema.serialize(&message.payload)?;
        self.send(message.target, &bytes)
    }

    fn transmit(&self, target: IpAddr, fragment: &Fragment) -> std::result::Result<(), TransportError> {
        let packet = self.carrier.wrap(target, &fragment.to_envelope())?;
        self.transport.send_to(&packet, target)?;
        Ok(())
    }

    /// Sender id used as transmission id
    #[must_use]
    pub fn sender_id(&self) -> u16 {
        self.sender_id
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }
}

/// Messaging session over one transport
pub struct Messager<T: RawTransport> {
    config: SessionConfig,
    outbound: MessageSender<T>,
    cache: ReassemblyCache,
    shutdown: ShutdownHandle,
    last_sweep: Instant,
}

impl<T: RawTransport> Messager<T> {
    /// Create a session that owns `transport`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and
    /// `Error::Transport` if the read timeout cannot be applied.
    pub fn new(config: SessionConfig, secret: Secret, transport: T) -> Result<Self> {
        Self::with_shared_transport(config, secret, Arc::new(transport))
    }

    /// Create a session over a transport that is shared elsewhere.
    ///
    /// # Errors
    ///
    /// As [`Messager::new`].
    pub fn with_shared_transport(
        config: SessionConfig,
        secret: Secret,
        transport: Arc<T>,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(timeout) = config.read_timeout {
            transport.set_read_timeout(Some(timeout))?;
        }

        let span = info_span!(
            "session",
            sender_id = config.sender_id,
            carrier = %config.carrier
        );
        let outbound = MessageSender {
            sender_id: config.sender_id,
            size: config.bytes_per_fragment,
            carrier: config.carrier,
            secret: Arc::new(secret),
            transport,
            stats: Arc::new(StatsCounters::default()),
            span,
        };
        let cache = ReassemblyCache::new(
            config.sender_id,
            config.sweep_interval,
            config.max_open_transmissions,
        );

        Ok(Self {
            config,
            outbound,
            cache,
            shutdown: ShutdownHandle::default(),
            last_sweep: Instant::now(),
        })
    }

    /// Replace the tracing span every operation of this session runs in.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.outbound.span = span;
        self
    }

    /// Encrypt `payload` and transmit it to `target`.
    ///
    /// # Errors
    ///
    /// As [`MessageSender::send`].
    pub fn send(&self, target: IpAddr, payload: &[u8]) -> Result<usize> {
        self.outbound.send(target, payload)
    }

    /// Serialize a typed message and send it.
    ///
    /// # Errors
    ///
    /// As [`MessageSender::send_message`].
    pub fn send_message<S: PayloadSchema>(
        &self,
        schema: &S,
        message: &Message<S::Item>,
    ) -> Result<usize> {
        self.outbound.send_message(schema, message)
    }

    /// Cloneable sending handle sharing this session's transport and secret
    #[must_use]
    pub fn sender(&self) -> MessageSender<T> {
        self.outbound.clone()
    }

    /// Handle that stops [`Messager::receive`]
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run the blocking receive loop.
    ///
    /// Every completed transmission is passed to `callback` on this thread.
    /// Returns `Ok(())` after shutdown is requested or the transport closes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the transport fails. The session stays
    /// usable and `receive` may be called again.
    pub fn receive<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(Inbound),
    {
        let span = self.outbound.span.clone();
        let _enter = span.enter();
        info!(timeout = ?self.config.read_timeout, "receive loop started");

        let mut buf = vec![0u8; self.config.recv_buffer_size];
        loop {
            if self.shutdown.is_shutdown() {
                info!("receive loop stopped");
                return Ok(());
            }
            self.maybe_sweep();

            match self.outbound.transport.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    if let Some(inbound) = self.handle_packet(&buf[..len], peer) {
                        callback(inbound);
                    }
                }
                Err(e) if e.is_timeout() => {}
                Err(TransportError::Closed) => {
                    info!("transport closed, receive loop stopped");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Process one received packet.
    ///
    /// Returns the completed transmission, if this packet finished one.
    pub fn handle_packet(&mut self, packet: &[u8], peer: IpAddr) -> Option<Inbound> {
        let span = self.outbound.span.clone();
        let _enter = span.enter();
        let stats = &self.outbound.stats;
        StatsCounters::bump(&stats.packets_received);

        let Some(envelope) = self.config.carrier.unwrap(packet) else {
            StatsCounters::bump(&stats.packets_discarded);
            trace!(%peer, len = packet.len(), "not a carrier packet");
            return None;
        };

        let fragment = match Fragment::parse(envelope) {
            Ok(fragment) => fragment,
            Err(e) => {
                StatsCounters::bump(&stats.packets_discarded);
                trace!(%peer, error = %e, "unparsable fragment");
                return None;
            }
        };

        match self.cache.admit(peer, fragment) {
            Admission::Complete(fragments) => self.complete(peer, &fragments),
            Admission::Discarded(reason) => {
                StatsCounters::bump(&stats.packets_discarded);
                trace!(%peer, ?reason, "fragment discarded");
                None
            }
            admission => {
                trace!(%peer, ?admission, "fragment stored");
                None
            }
        }
    }

    fn complete(&self, peer: IpAddr, fragments: &[Fragment]) -> Option<Inbound> {
        let stats = &self.outbound.stats;
        let transmission_id = fragments.first().map(Fragment::transmission_id)?;

        match shifter::decode(fragments, &self.outbound.secret) {
            Ok(payload) => {
                StatsCounters::bump(&stats.messages_delivered);
                debug!(%peer, transmission_id, len = payload.len(), "message delivered");
                Some(Inbound {
                    peer,
                    transmission_id,
                    payload: Ok(payload),
                })
            }
            Err(Error::VerificationFailed) => {
                StatsCounters::bump(&stats.verification_failures);
                warn!(%peer, transmission_id, "message failed verification");
                Some(Inbound {
                    peer,
                    transmission_id,
                    payload: Err(Error::VerificationFailed),
                })
            }
            Err(e) => {
                StatsCounters::bump(&stats.malformed_transmissions);
                warn!(%peer, transmission_id, error = %e, "malformed transmission dropped");
                None
            }
        }
    }

    fn maybe_sweep(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_sweep) < self.config.sweep_interval {
            return;
        }
        self.last_sweep = now;
        let expired = self.cache.sweep_at(now);
        StatsCounters::add(&self.outbound.stats.expired_transmissions, expired as u64);
    }

    /// Run an idle sweep now, returning the number of expired transmissions.
    pub fn sweep(&mut self) -> usize {
        self.last_sweep = Instant::now();
        let expired = self.cache.sweep_at(self.last_sweep);
        StatsCounters::add(&self.outbound.stats.expired_transmissions, expired as u64);
        expired
    }

    /// Number of transmissions currently being reassembled
    #[must_use]
    pub fn open_transmissions(&self) -> usize {
        self.cache.len()
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Underlying transport
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.outbound.transport
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.outbound.stats.snapshot()
    }
}

/// Durations as (fractional) seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(de::Error::custom))
            .transpose()
    }
}
