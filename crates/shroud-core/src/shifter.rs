//! Message fragmentation and reconstruction.
//!
//! A message is encrypted under a fresh random nonce, then the nonce and the
//! ciphertext (tag included) are cut into fixed-size chunks. Each chunk
//! becomes one header-tagged [`Fragment`]. The first fragment carries START
//! and the last carries END.
//!
//! The final ciphertext chunk is zero-padded to the fragment size and the
//! receiver trims trailing zeros before decrypting. A ciphertext that itself
//! ends in zero bytes is recovered by growing the trimmed candidate back
//! towards the padded length, one byte at a time, within the final chunk.

use crate::error::{ConfigError, Error, FrameError, Result};
use crate::frame::{Fragment, FragmentType, mark_boundaries};
use serde::{Deserialize, Serialize};
use shroud_crypto::{CryptoError, NONCE_SIZE, Nonce, Secret, TAG_SIZE, transmission_aad};
use std::fmt;
use tracing::trace;

/// Bytes of payload per fragment (4..=32, multiple of 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FragmentSize(u8);

impl FragmentSize {
    /// Smallest fragment size
    pub const MIN: u8 = 4;
    /// Largest fragment size
    pub const MAX: u8 = 32;
    /// Default fragment size
    pub const DEFAULT: Self = Self(16);

    /// Validate a fragment size.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFragmentSize` unless `bytes` is a
    /// multiple of 4 between 4 and 32.
    pub fn new(bytes: u8) -> std::result::Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&bytes) && bytes % 4 == 0 {
            Ok(Self(bytes))
        } else {
            Err(ConfigError::InvalidFragmentSize(bytes))
        }
    }

    /// Fragment size in bytes
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Chunk size used for the nonce, also the size class of nonce fragments
    #[must_use]
    pub const fn nonce_chunk(self) -> usize {
        if self.get() < NONCE_SIZE {
            self.get()
        } else {
            NONCE_SIZE
        }
    }
}

impl Default for FragmentSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for FragmentSize {
    type Error = ConfigError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FragmentSize> for u8 {
    fn from(size: FragmentSize) -> Self {
        size.0
    }
}

impl fmt::Display for FragmentSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of fragments `encode` produces for a `len`-byte message.
#[must_use]
pub fn fragment_count(len: usize, size: FragmentSize) -> usize {
    NONCE_SIZE.div_ceil(size.nonce_chunk()) + (len + TAG_SIZE).div_ceil(size.get())
}

/// Encrypt and fragment a message under a fresh random nonce.
///
/// The transmission id is the sender id.
///
/// # Errors
///
/// Returns `Error::Crypto` if the OS CSPRNG or the cipher fails.
pub fn encode(
    plaintext: &[u8],
    sender_id: u16,
    secret: &Secret,
    size: FragmentSize,
) -> Result<Vec<Fragment>> {
    let nonce = Nonce::random()?;
    encode_with_nonce(plaintext, sender_id, secret, size, &nonce)
}

/// Encrypt and fragment a message under a caller-chosen nonce.
///
/// Reusing a nonce with the same secret breaks confidentiality; this exists
/// for reproducible encodings.
///
/// # Errors
///
/// Returns `Error::Crypto` if the cipher fails.
pub fn encode_with_nonce(
    plaintext: &[u8],
    sender_id: u16,
    secret: &Secret,
    size: FragmentSize,
    nonce: &Nonce,
) -> Result<Vec<Fragment>> {
    let ciphertext = secret.encrypt(nonce, plaintext, &transmission_aad(sender_id))?;

    let mut fragments = Vec::with_capacity(fragment_count(plaintext.len(), size));
    split_into(
        &mut fragments,
        nonce.as_bytes(),
        FragmentType::Nonce,
        sender_id,
        size.nonce_chunk(),
    )?;
    split_into(
        &mut fragments,
        &ciphertext,
        FragmentType::Ciphertext,
        sender_id,
        size.get(),
    )?;
    mark_boundaries(&mut fragments);

    trace!(
        sender_id,
        len = plaintext.len(),
        fragments = fragments.len(),
        "encoded message"
    );
    Ok(fragments)
}

fn split_into(
    out: &mut Vec<Fragment>,
    data: &[u8],
    fragment_type: FragmentType,
    transmission_id: u16,
    chunk: usize,
) -> Result<()> {
    for piece in data.chunks(chunk) {
        let mut payload = piece.to_vec();
        payload.resize(chunk, 0);
        out.push(Fragment::new(fragment_type, transmission_id, payload)?);
    }
    Ok(())
}

/// Reassemble and decrypt the fragments of one transmission.
///
/// Fragments are taken in the given order. START/END flags are not checked
/// here; the reassembly cache has already used them.
///
/// # Errors
///
/// Returns `Error::Frame` for an empty or mixed set, fewer than 12 nonce
/// bytes or no ciphertext, and `Error::VerificationFailed` if no candidate
/// ciphertext authenticates.
pub fn decode(fragments: &[Fragment], secret: &Secret) -> Result<Vec<u8>> {
    let first = fragments.first().ok_or(FrameError::Empty)?;
    let transmission_id = first.transmission_id();
    if let Some(stray) = fragments
        .iter()
        .find(|f| f.transmission_id() != transmission_id)
    {
        return Err(FrameError::MixedTransmissions {
            expected: transmission_id,
            found: stray.transmission_id(),
        }
        .into());
    }

    let nonce_bytes: Vec<u8> = payloads(fragments, FragmentType::Nonce)
        .flatten()
        .copied()
        .collect();
    let nonce = nonce_bytes
        .get(..NONCE_SIZE)
        .ok_or(FrameError::MissingNonce {
            actual: nonce_bytes.len(),
        })?;
    let nonce = Nonce::from_slice(nonce)?;

    let chunks: Vec<&[u8]> = payloads(fragments, FragmentType::Ciphertext).collect();
    let last_chunk = chunks.last().ok_or(FrameError::MissingCiphertext)?.len();
    let padded = chunks.concat();

    let trimmed = padded.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    // The real ciphertext ends inside the final chunk.
    let floor = padded.len() + 1 - last_chunk.max(1);

    let aad = transmission_aad(transmission_id);
    for len in trimmed.max(floor)..=padded.len() {
        match secret.decrypt(&nonce, &padded[..len], &aad) {
            Ok(plaintext) => {
                if len != trimmed {
                    trace!(transmission_id, len, trimmed, "recovered zero-suffixed ciphertext");
                }
                return Ok(plaintext);
            }
            Err(CryptoError::DecryptionFailed) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::VerificationFailed)
}

fn payloads(
    fragments: &[Fragment],
    fragment_type: FragmentType,
) -> impl Iterator<Item = &[u8]> {
    fragments
        .iter()
        .filter(move |f| f.fragment_type() == fragment_type)
        .map(Fragment::payload)
}
