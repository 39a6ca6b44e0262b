//! Fragment header encoding and decoding.
//!
//! Every fragment starts with a 4-byte big-endian header:
//!
//! ```text
//! | 1 | 1 | E | S | TYPE (4) | TRANSMISSION ID (16) | SIZE (8) |
//!   |   |   |   |
//!   |   |   |   +-- START boundary
//!   |   |   +------ END boundary
//!   |   +---------- TRANSMISSION bit
//!   +-------------- PREFIX marker
//! ```
//!
//! Boundary marking ORs the status bit in and then toggles the TRANSMISSION
//! bit, so a fragment marked both START and END ends up with TRANSMISSION set
//! again. Receivers never inspect that bit.

use crate::error::FrameError;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Prefix marker, always set on Shroud fragments.
pub const PREFIX: u8 = 0x80;

/// Transmission bit, toggled by each boundary mark.
pub const TRANSMISSION: u8 = 0x40;

/// First fragment of a transmission.
pub const START: u8 = 0x10;

/// Last fragment of a transmission.
pub const END: u8 = 0x20;

const TYPE_MASK: u8 = 0x0f;

/// Fragment payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FragmentType {
    /// Ciphertext and tag bytes
    Ciphertext = 0x01,
    /// Nonce bytes
    Nonce = 0x02,
}

impl TryFrom<u8> for FragmentType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Ciphertext),
            0x02 => Ok(Self::Nonce),
            other => Err(FrameError::InvalidFragmentType(other)),
        }
    }
}

/// Decoded fragment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    flags: u8,
    fragment_type: FragmentType,
    transmission_id: u16,
    size: u8,
}

impl FrameHeader {
    /// Create an unmarked header.
    #[must_use]
    pub fn new(fragment_type: FragmentType, transmission_id: u16, size: u8) -> Self {
        Self {
            flags: PREFIX | TRANSMISSION | fragment_type as u8,
            fragment_type,
            transmission_id,
            size,
        }
    }

    /// Encode to wire format
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let id = self.transmission_id.to_be_bytes();
        [self.flags, id[0], id[1], self.size]
    }

    /// Decode from the first four bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` if fewer than four bytes are given, the prefix
    /// marker is missing or the fragment type is unknown.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let Some(&[flags, id_hi, id_lo, size]) = data.first_chunk::<HEADER_SIZE>() else {
            return Err(FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        };

        if flags & PREFIX == 0 {
            return Err(FrameError::MissingPrefix(flags));
        }
        let fragment_type = FragmentType::try_from(flags & TYPE_MASK)?;

        Ok(Self {
            flags,
            fragment_type,
            transmission_id: u16::from_be_bytes([id_hi, id_lo]),
            size,
        })
    }

    /// Mark as the first fragment of its transmission
    pub fn mark_start(&mut self) {
        self.flags = (self.flags | START) ^ TRANSMISSION;
    }

    /// Mark as the last fragment of its transmission
    pub fn mark_end(&mut self) {
        self.flags = (self.flags | END) ^ TRANSMISSION;
    }

    /// Check START flag
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.flags & START != 0
    }

    /// Check END flag
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.flags & END != 0
    }

    /// Get fragment type
    #[must_use]
    pub fn fragment_type(&self) -> FragmentType {
        self.fragment_type
    }

    /// Get transmission ID
    #[must_use]
    pub fn transmission_id(&self) -> u16 {
        self.transmission_id
    }

    /// Get the size class (bytes per fragment, also the declared payload length)
    #[must_use]
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Raw first header byte
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }
}

/// Header plus payload chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    header: FrameHeader,
    payload: Vec<u8>,
}

impl Fragment {
    /// Create an unmarked fragment whose size class is the chunk length.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::ChunkTooLarge` if `chunk` is longer than 255 bytes.
    pub fn new(
        fragment_type: FragmentType,
        transmission_id: u16,
        chunk: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let size = u8::try_from(chunk.len()).map_err(|_| FrameError::ChunkTooLarge(chunk.len()))?;
        Ok(Self {
            header: FrameHeader::new(fragment_type, transmission_id, size),
            payload: chunk,
        })
    }

    /// Parse an envelope (header followed by at least `size` payload bytes).
    ///
    /// Bytes past the declared length are ignored.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` for a bad header or a declared length larger than
    /// the bytes available.
    pub fn parse(envelope: &[u8]) -> Result<Self, FrameError> {
        let header = FrameHeader::decode(envelope)?;
        let declared = usize::from(header.size);
        let available = envelope.len() - HEADER_SIZE;
        if declared > available {
            return Err(FrameError::LengthOverflow {
                declared,
                available,
            });
        }

        Ok(Self {
            header,
            payload: envelope[HEADER_SIZE..HEADER_SIZE + declared].to_vec(),
        })
    }

    /// Serialize as header plus payload, zero-padded to the declared length.
    #[must_use]
    pub fn to_envelope(&self) -> Vec<u8> {
        let len = HEADER_SIZE + usize::from(self.header.size).max(self.payload.len());
        let mut envelope = Vec::with_capacity(len);
        envelope.extend_from_slice(&self.header.encode());
        envelope.extend_from_slice(&self.payload);
        envelope.resize(len, 0);
        envelope
    }

    /// Get the header
    #[must_use]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Get the payload
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get fragment type
    #[must_use]
    pub fn fragment_type(&self) -> FragmentType {
        self.header.fragment_type
    }

    /// Get transmission ID
    #[must_use]
    pub fn transmission_id(&self) -> u16 {
        self.header.transmission_id
    }

    /// Check START flag
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.header.is_start()
    }

    /// Check END flag
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.header.is_end()
    }
}

/// Mark the first fragment START and the last END.
///
/// A single fragment receives both marks, START first.
pub fn mark_boundaries(fragments: &mut [Fragment]) {
    if let Some(first) = fragments.first_mut() {
        first.header.mark_start();
    }
    if let Some(last) = fragments.last_mut() {
        last.header.mark_end();
    }
}
