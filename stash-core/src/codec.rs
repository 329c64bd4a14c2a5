//! Encode/decode hooks applied at the storage boundary.
//!
//! The cache core only ever moves bytes in and out of the store. A [`Codec`]
//! turns the caller's values into those bytes before every write and back
//! after every read.

use std::fmt;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;

/// Transform between cached values and their stored bytes.
pub trait Codec: Send + Sync {
    /// The value type handed to and returned from the cache.
    type Value;

    /// Applied before every write.
    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>, CodecError>;

    /// Applied after every read.
    fn decode(&self, raw: &[u8]) -> Result<Self::Value, CodecError>;

    /// Whether stored bytes hold an empty value. Empty entries are still
    /// cached but read back as `None`.
    ///
    /// The default treats only zero bytes as empty, which covers empty bytes
    /// and empty text under [`Passthrough`].
    fn is_empty(&self, raw: &[u8]) -> bool {
        raw.is_empty()
    }
}

/// Identity transform. The default codec of every cache.
///
/// Implemented for raw bytes and for UTF-8 text.
pub struct Passthrough<T = Vec<u8>>(PhantomData<fn() -> T>);

impl<T> Passthrough<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Passthrough<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Passthrough<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Passthrough<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passthrough")
    }
}

impl Codec for Passthrough<Vec<u8>> {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(value.clone())
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(raw.to_vec())
    }
}

impl Codec for Passthrough<String> {
    type Value = String;

    fn encode(&self, value: &String) -> Result<Vec<u8>, CodecError> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, raw: &[u8]) -> Result<String, CodecError> {
        String::from_utf8(raw.to_vec()).map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })
    }
}

/// Stores serde types as JSON.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            reason: e.to_string(),
        })
    }

    fn decode(&self, raw: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(raw).map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })
    }

    /// `null`, `""`, `[]` and `{}` are empty, as is a zero-byte entry.
    fn is_empty(&self, raw: &[u8]) -> bool {
        matches!(
            trim_json_whitespace(raw),
            b"" | b"null" | b"\"\"" | b"[]" | b"{}"
        )
    }
}

fn trim_json_whitespace(raw: &[u8]) -> &[u8] {
    let is_ws = |b: &u8| matches!(*b, b' ' | b'\t' | b'\n' | b'\r');
    let start = raw.iter().position(|b| !is_ws(b)).unwrap_or(raw.len());
    let end = raw.iter().rposition(|b| !is_ws(b)).map_or(start, |i| i + 1);
    &raw[start..end]
}

/// A codec built from two user-supplied, infallible transforms.
///
/// ```
/// use stash_core::{Codec, FnCodec};
///
/// let codec = FnCodec::new(
///     |n: &u32| n.to_be_bytes().to_vec(),
///     |raw: &[u8]| raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)),
/// );
/// let raw = codec.encode(&258).unwrap();
/// assert_eq!(codec.decode(&raw).unwrap(), 258);
/// ```
pub struct FnCodec<T, Enc, Dec> {
    encode: Enc,
    decode: Dec,
    _value: PhantomData<fn() -> T>,
}

impl<T, Enc, Dec> FnCodec<T, Enc, Dec>
where
    Enc: Fn(&T) -> Vec<u8>,
    Dec: Fn(&[u8]) -> T,
{
    pub fn new(encode: Enc, decode: Dec) -> Self {
        Self {
            encode,
            decode,
            _value: PhantomData,
        }
    }
}

impl<T, Enc, Dec> Codec for FnCodec<T, Enc, Dec>
where
    Enc: Fn(&T) -> Vec<u8> + Send + Sync,
    Dec: Fn(&[u8]) -> T + Send + Sync,
{
    type Value = T;

    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok((self.encode)(value))
    }

    fn decode(&self, raw: &[u8]) -> Result<T, CodecError> {
        Ok((self.decode)(raw))
    }
}
