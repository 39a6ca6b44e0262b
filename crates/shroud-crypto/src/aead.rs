//! `ChaCha20-Poly1305` AEAD encryption.
//!
//! Provides authenticated encryption with associated data (AEAD) using
//! `ChaCha20-Poly1305` (RFC 8439). Features include:
//! - 256-bit pre-shared keys
//! - 96-bit nonces, drawn fresh from the OS CSPRNG for every message
//! - 128-bit authentication tags
//! - Associated data binding a ciphertext to its transmission id
//!
//! ## Security Properties
//!
//! - Confidentiality: `ChaCha20` stream cipher
//! - Integrity: Poly1305 MAC with 128-bit security
//! - Splicing: the transmission id is authenticated as associated data, so
//!   fragments of one transmission cannot be replayed under another id
//!
//! ## Usage
//!
//! ```
//! use shroud_crypto::aead::{Nonce, Secret, transmission_aad};
//!
//! let secret = Secret::new([0x42; 32]);
//! let nonce = Nonce::random().unwrap();
//! let aad = transmission_aad(7);
//!
//! let ciphertext = secret.encrypt(&nonce, b"secret", &aad).unwrap();
//! let plaintext = secret.decrypt(&nonce, &ciphertext, &aad).unwrap();
//! assert_eq!(plaintext, b"secret");
//! ```

use crate::{AAD_SIZE, CryptoError, random};
use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// ChaCha20-Poly1305 nonce size (12 bytes / 96 bits).
pub const NONCE_SIZE: usize = 12;

/// Pre-shared key size (32 bytes / 256 bits).
pub const KEY_SIZE: usize = 32;

/// Build the associated data for a transmission.
///
/// The 16-bit transmission id is zero-extended to 32 bits, big-endian.
#[must_use]
pub fn transmission_aad(transmission_id: u16) -> [u8; AAD_SIZE] {
    u32::from(transmission_id).to_be_bytes()
}

/// ChaCha20-Poly1305 nonce (12 bytes).
///
/// A fresh random nonce is drawn for every message. The 96-bit space keeps
/// random collisions negligible at the message rates a covert channel
/// sustains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidNonceLength` if the slice is not 12 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; NONCE_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: NONCE_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Draw a nonce from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if the OS CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        random::random_12().map(Self)
    }

    /// Generate a nonce from a caller-supplied RNG.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &chacha20poly1305::Nonce {
        chacha20poly1305::Nonce::from_slice(&self.0)
    }
}

/// Pre-shared symmetric secret (32 bytes).
///
/// Immutable for the lifetime of a session and zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Secret([u8; KEY_SIZE]);

impl Secret {
    /// Create a secret from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Decode a secret from 64 hex characters.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyEncoding` for non-hex input and
    /// `CryptoError::InvalidKeyLength` if it does not decode to 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Encode the secret as lowercase hex.
    ///
    /// # Security
    ///
    /// The returned string holds the raw key material and is not zeroized.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Generate a random secret from a caller-supplied RNG.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with extreme care - this exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encrypt plaintext with associated data.
    ///
    /// Returns ciphertext with appended authentication tag (`plaintext.len()` + 16 bytes).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new((&self.0).into());

        cipher
            .encrypt(
                nonce.as_generic(),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext with associated data.
    ///
    /// Input must include the authentication tag at the end. No plaintext is
    /// released unless the tag verifies.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on authentication failure.
    pub fn decrypt(
        &self,
        nonce: &Nonce,
        ciphertext_and_tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let cipher = ChaCha20Poly1305::new((&self.0).into());

        cipher
            .decrypt(
                nonce.as_generic(),
                Payload {
                    msg: ciphertext_and_tag,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_aead_roundtrip() {
        let secret = Secret::new([0x42u8; 32]);
        let nonce = Nonce::from_bytes([0x00u8; 12]);
        let plaintext = b"Hello, Shroud!";
        let aad = transmission_aad(1);

        let ciphertext = secret.encrypt(&nonce, plaintext, &aad).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = secret.decrypt(&nonce, &ciphertext, &aad).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_aead_tamper_detection() {
        let secret = Secret::new([0x42u8; 32]);
        let nonce = Nonce::from_bytes([0x00u8; 12]);
        let aad = transmission_aad(1);

        let mut ciphertext = secret.encrypt(&nonce, b"Hello, Shroud!", &aad).unwrap();
        ciphertext[0] ^= 0xFF;

        assert_eq!(
            secret.decrypt(&nonce, &ciphertext, &aad),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_aead_wrong_secret_fails() {
        let secret1 = Secret::generate(&mut OsRng);
        let secret2 = Secret::generate(&mut OsRng);
        let nonce = Nonce::generate(&mut OsRng);

        let ciphertext = secret1.encrypt(&nonce, b"secret", b"").unwrap();
        assert!(secret2.decrypt(&nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn test_aead_wrong_nonce_fails() {
        let secret = Secret::generate(&mut OsRng);
        let nonce1 = Nonce::generate(&mut OsRng);
        let nonce2 = Nonce::generate(&mut OsRng);

        let ciphertext = secret.encrypt(&nonce1, b"secret", b"").unwrap();
        assert!(secret.decrypt(&nonce2, &ciphertext, b"").is_err());
    }

    #[test]
    fn test_aead_other_transmission_fails() {
        let secret = Secret::generate(&mut OsRng);
        let nonce = Nonce::random().unwrap();

        let ciphertext = secret
            .encrypt(&nonce, b"secret", &transmission_aad(1))
            .unwrap();
        assert!(
            secret
                .decrypt(&nonce, &ciphertext, &transmission_aad(2))
                .is_err()
        );
    }

    #[test]
    fn test_decrypt_shorter_than_tag() {
        let secret = Secret::new([1u8; 32]);
        let nonce = Nonce::default();
        assert_eq!(
            secret.decrypt(&nonce, &[0u8; TAG_SIZE - 1], b""),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_empty_plaintext_is_tag_only() {
        let secret = Secret::new([1u8; 32]);
        let nonce = Nonce::default();
        let ciphertext = secret.encrypt(&nonce, b"", b"").unwrap();
        assert_eq!(ciphertext.len(), TAG_SIZE);
        assert!(secret.decrypt(&nonce, &ciphertext, b"").unwrap().is_empty());
    }

    #[test]
    fn test_transmission_aad_layout() {
        assert_eq!(transmission_aad(0), [0, 0, 0, 0]);
        assert_eq!(transmission_aad(1), [0, 0, 0, 1]);
        assert_eq!(transmission_aad(0xABCD), [0, 0, 0xAB, 0xCD]);
    }

    #[test]
    fn test_secret_from_slice() {
        assert!(Secret::from_slice(&[0u8; 32]).is_ok());
        assert_eq!(
            Secret::from_slice(&[0u8; 31]).unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let secret = Secret::generate(&mut OsRng);
        let encoded = secret.to_hex();
        assert_eq!(encoded.len(), 64);

        let decoded = Secret::from_hex(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), secret.as_bytes());

        assert!(matches!(
            Secret::from_hex("not hex"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
        assert!(matches!(
            Secret::from_hex("abcd"),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new([0xAB; 32]);
        assert_eq!(format!("{secret:?}"), "Secret(..)");
    }

    #[test]
    fn test_nonce_from_slice() {
        let bytes = [0x42u8; NONCE_SIZE];
        let nonce = Nonce::from_slice(&bytes).unwrap();
        assert_eq!(nonce.as_bytes(), &bytes);

        assert_eq!(
            Nonce::from_slice(&[0u8; 11]),
            Err(CryptoError::InvalidNonceLength {
                expected: 12,
                actual: 11
            })
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn roundtrip_any_transmission(
                key in any::<[u8; 32]>(),
                nonce in any::<[u8; 12]>(),
                id in any::<u16>(),
                plaintext in prop::collection::vec(any::<u8>(), 0..512),
            ) {
                let secret = Secret::new(key);
                let nonce = Nonce::from_bytes(nonce);
                let aad = transmission_aad(id);

                let ciphertext = secret.encrypt(&nonce, &plaintext, &aad).unwrap();
                prop_assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
                prop_assert_eq!(secret.decrypt(&nonce, &ciphertext, &aad).unwrap(), plaintext);
            }
        }
    }
}
