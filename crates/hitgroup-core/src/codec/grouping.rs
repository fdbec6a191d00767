//! Module: codec::grouping
//! Responsibility: encoding a full grouping request (id, level window,
//! levels, root collect).
//! Does not own: the group tree; results travel separately.

use crate::{
    aggregation::{Grouping, GroupingLevel},
    codec::{FormatError, WireReader, WireWriter},
    config::GroupingConfig,
    error::InternalError,
    serialize::SerializeError,
};
use serde::{Serialize, de::DeserializeOwned};

/// Leading u32 of an encoded grouping request.
pub const GROUPING_WIRE_TAG: u32 = 0x4000_0200;

const ROOT_COLLECT_ABSENT: u8 = 0;
const ROOT_COLLECT_PRESENT: u8 = 1;

impl<X: Serialize> Grouping<X> {
    /// Encode the request with the wire version this grouping's config allows.
    pub fn encode(&self) -> Result<Vec<u8>, InternalError> {
        self.serialize(self.config.allow_v2)
    }

    /// Encode the request. Filters survive only when `allow_v2` is set.
    pub fn serialize(&self, allow_v2: bool) -> Result<Vec<u8>, InternalError> {
        self.write_request(allow_v2)
            .map(WireWriter::into_bytes)
            .map_err(|err| {
                InternalError::serialize_internal(format!("grouping encode failed: {err}"))
            })
    }

    fn write_request(&self, allow_v2: bool) -> Result<WireWriter, FormatError> {
        let mut out = WireWriter::new();

        out.put_u32(GROUPING_WIRE_TAG);
        out.put_u32(self.id);
        out.put_u32(wire_len("first_level", self.first_level)?);
        out.put_u32(wire_len("last_level", self.last_level)?);
        out.put_u32(wire_len("level_count", self.levels.len())?);
        for level in &self.levels {
            level.serialize_variant(&mut out, allow_v2)?;
        }
        match &self.root_collect {
            Some(collect) => {
                out.put_u8(ROOT_COLLECT_PRESENT);
                out.put_expression(collect)?;
            }
            None => out.put_u8(ROOT_COLLECT_ABSENT),
        }

        Ok(out)
    }
}

impl<X: DeserializeOwned> Grouping<X> {
    /// Decode a request, accepting V2 levels only when `config.allow_v2` is set.
    pub fn decode(bytes: &[u8], config: GroupingConfig) -> Result<Self, InternalError> {
        Self::deserialize(bytes, config.allow_v2, config)
    }

    /// Decode a request produced by [`Grouping::serialize`]. The result is
    /// unprepared and carries `config`.
    pub fn deserialize(
        bytes: &[u8],
        allow_v2: bool,
        config: GroupingConfig,
    ) -> Result<Self, InternalError> {
        Ok(Self::read_request(bytes, allow_v2, config)?)
    }

    fn read_request(
        bytes: &[u8],
        allow_v2: bool,
        config: GroupingConfig,
    ) -> Result<Self, FormatError> {
        if bytes.len() > config.max_decode_bytes {
            return Err(FormatError::Expression(
                SerializeError::DeserializeSizeLimitExceeded {
                    len: bytes.len(),
                    max_bytes: config.max_decode_bytes,
                },
            ));
        }
        let mut input = WireReader::new(bytes, config.max_decode_bytes);

        let tag = input.get_u32()?;
        if tag != GROUPING_WIRE_TAG {
            return Err(FormatError::UnexpectedTag {
                expected: GROUPING_WIRE_TAG,
                found: tag,
            });
        }
        let id = input.get_u32()?;
        let first_level = input.get_u32()? as usize;
        let last_level = input.get_u32()? as usize;
        let count = input.get_u32()? as usize;

        if last_level > count {
            return Err(FormatError::ValueOutOfRange {
                field: "last_level",
                value: last_level as u64,
            });
        }
        if first_level > last_level {
            return Err(FormatError::ValueOutOfRange {
                field: "first_level",
                value: first_level as u64,
            });
        }

        let mut levels = Vec::new();
        for _ in 0..count {
            levels.push(GroupingLevel::deserialize_variant(&mut input, allow_v2)?);
        }
        let root_collect = match input.get_u8()? {
            ROOT_COLLECT_ABSENT => None,
            ROOT_COLLECT_PRESENT => Some(input.get_expression()?),
            flag => return Err(FormatError::InvalidFlag { flag }),
        };
        input.finish()?;

        let grouping = Self::new(levels)
            .with_id(id)
            .with_first_level(first_level)
            .with_last_level(last_level)
            .with_config(config);

        Ok(match root_collect {
            Some(collect) => grouping.with_root_collect(collect),
            None => grouping,
        })
    }
}

fn wire_len(field: &'static str, value: usize) -> Result<u32, FormatError> {
    u32::try_from(value).map_err(|_| FormatError::ValueOutOfRange {
        field,
        value: u64::try_from(value).unwrap_or(u64::MAX),
    })
}
