use crate::serialize::SerializeError;
use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::{from_slice, to_vec};
use std::panic::{AssertUnwindSafe, catch_unwind};

pub(super) fn serialize<T: Serialize>(expr: &T) -> Result<Vec<u8>, SerializeError> {
    to_vec(expr).map_err(|err| SerializeError::Serialize(err.to_string()))
}

/// The length check runs before parsing; a panicking decoder surfaces as
/// `SerializeError::Deserialize`.
pub(super) fn deserialize_bounded<T: DeserializeOwned>(
    bytes: &[u8],
    max_bytes: usize,
) -> Result<T, SerializeError> {
    if bytes.len() > max_bytes {
        return Err(SerializeError::DeserializeSizeLimitExceeded {
            len: bytes.len(),
            max_bytes,
        });
    }

    match catch_unwind(AssertUnwindSafe(|| from_slice(bytes))) {
        Ok(decoded) => decoded.map_err(|err| SerializeError::Deserialize(err.to_string())),
        Err(_) => Err(SerializeError::Deserialize(
            "decoder panicked on expression payload".to_string(),
        )),
    }
}

///
/// TESTS
///
