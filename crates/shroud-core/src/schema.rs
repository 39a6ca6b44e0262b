//! Payload schemas.
//!
//! The protocol moves opaque bytes. A [`PayloadSchema`] turns application
//! values into those bytes and back, so sessions can exchange typed
//! [`Message`]s.

use crate::error::SchemaError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::net::IpAddr;

/// Conversion between application values and message bytes
pub trait PayloadSchema {
    /// Application value type
    type Item;

    /// Serialize a value into message bytes.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the value cannot be represented.
    fn serialize(&self, item: &Self::Item) -> Result<Vec<u8>, SchemaError>;

    /// Parse message bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the bytes are not a valid encoding.
    fn parse(&self, bytes: &[u8]) -> Result<Self::Item, SchemaError>;
}

/// JSON encoding of any serde type
pub struct JsonSchema<T>(PhantomData<fn() -> T>);

impl<T> JsonSchema<T> {
    /// Create a JSON schema
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> PayloadSchema for JsonSchema<T> {
    type Item = T;

    fn serialize(&self, item: &T) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(item)?)
    }

    fn parse(&self, bytes: &[u8]) -> Result<T, SchemaError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Bytes passed through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSchema;

impl PayloadSchema for RawSchema {
    type Item = Vec<u8>;

    fn serialize(&self, item: &Vec<u8>) -> Result<Vec<u8>, SchemaError> {
        Ok(item.clone())
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<u8>, SchemaError> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSchema;

impl PayloadSchema for TextSchema {
    type Item = String;

    fn serialize(&self, item: &String) -> Result<Vec<u8>, SchemaError> {
        Ok(item.as_bytes().to_vec())
    }

    fn parse(&self, bytes: &[u8]) -> Result<String, SchemaError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| SchemaError::Invalid(e.to_string()))
    }
}

/// Typed message envelope.
///
/// For outgoing messages `target` is the destination; for delivered ones it
/// is the peer the message came from, so replies can reuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<T> {
    /// Destination (outgoing) or origin (delivered)
    pub target: IpAddr,
    /// Sender id of the originating session
    pub sender_id: u16,
    /// Application payload
    pub payload: T,
}

impl<T> Message<T> {
    /// Create a message
    pub fn new(target: IpAddr, sender_id: u16, payload: T) -> Self {
        Self {
            target,
            sender_id,
            payload,
        }
    }

    /// Replace the payload, keeping addressing
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            target: self.target,
            sender_id: self.sender_id,
            payload: f(self.payload),
        }
    }
}
