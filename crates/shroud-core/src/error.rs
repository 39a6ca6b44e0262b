//! Error types for the Shroud core protocol.

use shroud_crypto::CryptoError;
use shroud_transport::TransportError;
use thiserror::Error;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid session or codec configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed fragment or fragment set
    #[error("malformed fragment: {0}")]
    Frame(#[from] FrameError),

    /// AEAD tag did not verify (wrong secret, tampering or corruption)
    #[error("failed to verify message")]
    VerificationFailed,

    /// Cryptographic error other than verification
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Socket or packet error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Payload (de)serialization error
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl Error {
    /// Whether this is an authentication failure.
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::VerificationFailed)
    }
}

/// Fragment-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Envelope too short to hold a header
    #[error("fragment too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Prefix marker bit not set
    #[error("missing prefix marker in 0x{0:02X}")]
    MissingPrefix(u8),

    /// Fragment type nibble is not a known type
    #[error("invalid fragment type: {0}")]
    InvalidFragmentType(u8),

    /// Declared length exceeds the bytes carried
    #[error("declared length {declared} exceeds {available} available bytes")]
    LengthOverflow {
        /// Declared size class
        declared: usize,
        /// Bytes after the header
        available: usize,
    },

    /// Chunk longer than a size class can declare
    #[error("chunk of {0} bytes exceeds the 255-byte size class")]
    ChunkTooLarge(usize),

    /// Fragment set is empty
    #[error("no fragments")]
    Empty,

    /// Fragments from different transmissions were mixed
    #[error("mixed transmissions: expected id {expected}, found {found}")]
    MixedTransmissions {
        /// Id of the first fragment
        expected: u16,
        /// Conflicting id
        found: u16,
    },

    /// Not enough nonce bytes
    #[error("incomplete nonce: {actual} of 12 bytes")]
    MissingNonce {
        /// Nonce bytes collected
        actual: usize,
    },

    /// No ciphertext fragment in the set
    #[error("no ciphertext fragments")]
    MissingCiphertext,
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Bytes-per-fragment outside 4..=32 or not a multiple of 4
    #[error("invalid fragment size {0}: must be a multiple of 4 between 4 and 32")]
    InvalidFragmentSize(u8),

    /// Zero sweep interval
    #[error("sweep interval must be non-zero")]
    InvalidSweepInterval,

    /// Zero read timeout
    #[error("read timeout must be non-zero")]
    InvalidReadTimeout,

    /// Receive buffer cannot hold a minimal packet
    #[error("receive buffer of {0} bytes is too small")]
    InvalidRecvBuffer(usize),

    /// Reassembly cache capacity of zero
    #[error("max open transmissions must be non-zero")]
    InvalidMaxOpen,
}

/// Payload schema errors
#[derive(Debug, Error)]
pub enum SchemaError {
    /// JSON (de)serialization failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload bytes are not acceptable to the schema
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
