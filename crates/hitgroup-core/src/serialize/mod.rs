//! Module: serialize
//! Responsibility: CBOR encoding of opaque expression payloads.
//! Does not own: wire framing, tags or request-level limits (see `codec`).

mod cbor;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error as ThisError;

///
/// SerializeError
///
/// Failure while turning an expression into payload bytes or back.
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum SerializeError {
    #[error("expression encode failed: {0}")]
    Serialize(String),

    #[error("expression decode failed: {0}")]
    Deserialize(String),

    #[error("expression payload of {len} bytes exceeds limit of {max_bytes}")]
    DeserializeSizeLimitExceeded { len: usize, max_bytes: usize },
}

/// Encode one expression payload.
pub(crate) fn serialize<T: Serialize>(expr: &T) -> Result<Vec<u8>, SerializeError> {
    cbor::serialize(expr)
}

/// Decode one expression payload no larger than `max_bytes`.
pub(crate) fn deserialize_bounded<T: DeserializeOwned>(
    bytes: &[u8],
    max_bytes: usize,
) -> Result<T, SerializeError> {
    cbor::deserialize_bounded(bytes, max_bytes)
}
