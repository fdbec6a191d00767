//! Module: codec
//! Responsibility: big-endian framing for grouping descriptors and the
//! versioned level/grouping wire layouts.
//! Does not own: expression payload format (see `serialize`).
//! Boundary: expressions travel as u32 length-prefixed CBOR blobs.

mod grouping;
mod level;


pub use grouping::GROUPING_WIRE_TAG;
pub use level::{LevelWireTag, decode_layout, encode_layout};

use crate::serialize::{SerializeError, deserialize_bounded, serialize};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error as ThisError;

///
/// FormatError
///
/// Payload could not be decoded. Unknown level tags are not format errors;
/// they decode as V1.
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum FormatError {
    #[error("truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("{count} trailing bytes after payload")]
    TrailingBytes { count: usize },

    #[error("unexpected tag 0x{found:08x}, expected 0x{expected:08x}")]
    UnexpectedTag { expected: u32, found: u32 },

    #[error("invalid presence flag {flag}")]
    InvalidFlag { flag: u8 },

    #[error("{field} out of range: {value}")]
    ValueOutOfRange { field: &'static str, value: u64 },

    #[error("expression payload: {0}")]
    Expression(#[from] SerializeError),
}

///
/// WireWriter
///

#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a u32 length prefix followed by the raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            SerializeError::Serialize(format!("payload of {} bytes exceeds u32", bytes.len()))
        })?;
        self.put_u32(len);
        self.buf.extend_from_slice(bytes);

        Ok(())
    }

    pub fn put_expression<X: Serialize>(&mut self, expr: &X) -> Result<(), SerializeError> {
        let payload = serialize(expr)?;
        self.put_bytes(&payload)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

///
/// WireReader
///

#[derive(Debug)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    max_payload_bytes: usize,
}

impl<'a> WireReader<'a> {
    /// Reader over `bytes`; each length-prefixed payload is bounded by `max_payload_bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8], max_payload_bytes: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            max_payload_bytes,
        }
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn get_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn get_i64(&mut self) -> Result<i64, FormatError> {
        Ok(i64::from_be_bytes(self.take()?))
    }

    /// Read a u32 length-prefixed byte payload.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], FormatError> {
        let len = self.get_u32()? as usize;
        if len > self.max_payload_bytes {
            return Err(FormatError::Expression(
                SerializeError::DeserializeSizeLimitExceeded {
                    len,
                    max_bytes: self.max_payload_bytes,
                },
            ));
        }

        self.take_slice(len)
    }

    pub fn get_expression<X: DeserializeOwned>(&mut self) -> Result<X, FormatError> {
        let payload = self.get_bytes()?;
        Ok(deserialize_bounded(payload, self.max_payload_bytes)?)
    }

    /// Require that the whole input was consumed.
    pub const fn finish(self) -> Result<(), FormatError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(FormatError::TrailingBytes { count }),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let slice = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);

        Ok(out)
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(FormatError::Truncated {
                needed: len,
                remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;

        Ok(slice)
    }
}
