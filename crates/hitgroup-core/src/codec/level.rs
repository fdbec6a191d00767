//! Module: codec::level
//! Responsibility: V1/V2 layouts of a grouping level descriptor.
//! Does not own: expression payload bytes (see `serialize`).
//! Boundary: unknown tags decode as V1; V2 decodes only when the receiver
//! allows it.

use crate::{
    aggregation::GroupingLevel,
    codec::{FormatError, WireReader, WireWriter},
    obs::sink::{MetricsEvent, record},
};
use serde::{Serialize, de::DeserializeOwned};

///
/// LevelWireTag
///
/// Leading u32 of an encoded level.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u32)]
pub enum LevelWireTag {
    /// max_groups, precision, classify, collect.
    V1 = 0x4000_0101,
    /// max_groups, precision, classify, filter, collect.
    V2 = 0x4000_0102,
}

impl LevelWireTag {
    #[must_use]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0x4000_0101 => Some(Self::V1),
            0x4000_0102 => Some(Self::V2),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// Layout a writer uses: V2 only for a filtered level when V2 is allowed.
#[must_use]
pub const fn encode_layout(has_filter: bool, allow_v2: bool) -> LevelWireTag {
    if has_filter && allow_v2 {
        LevelWireTag::V2
    } else {
        LevelWireTag::V1
    }
}

/// Layout a reader applies to a raw tag. Everything except an allowed V2
/// tag is read as V1.
#[must_use]
pub const fn decode_layout(raw: u32, allow_v2: bool) -> LevelWireTag {
    match LevelWireTag::from_u32(raw) {
        Some(LevelWireTag::V2) if allow_v2 => LevelWireTag::V2,
        _ => LevelWireTag::V1,
    }
}

impl<X: Serialize> GroupingLevel<X> {
    /// Append this level to `out`. Without `allow_v2` the filter is dropped.
    pub fn serialize_variant(
        &self,
        out: &mut WireWriter,
        allow_v2: bool,
    ) -> Result<LevelWireTag, FormatError> {
        let tag = encode_layout(self.filter.is_some(), allow_v2);

        out.put_u32(tag.to_u32());
        out.put_i64(self.max_groups);
        out.put_i64(self.precision);
        out.put_expression(&self.classify)?;
        if let (LevelWireTag::V2, Some(filter)) = (tag, &self.filter) {
            out.put_expression(filter)?;
        }
        out.put_expression(&self.collect)?;

        record(MetricsEvent::LevelEncoded { tag });

        Ok(tag)
    }

    /// Encode this level as a standalone payload.
    pub fn encode_variant(&self, allow_v2: bool) -> Result<Vec<u8>, FormatError> {
        let mut out = WireWriter::new();
        self.serialize_variant(&mut out, allow_v2)?;

        Ok(out.into_bytes())
    }
}

impl<X: DeserializeOwned> GroupingLevel<X> {
    /// Read one level from `input`. The decoded level is unprepared.
    pub fn deserialize_variant(
        input: &mut WireReader<'_>,
        allow_v2: bool,
    ) -> Result<Self, FormatError> {
        let raw = input.get_u32()?;
        let tag = decode_layout(raw, allow_v2);
        let fallback = LevelWireTag::from_u32(raw) != Some(tag);
        if fallback {
            tracing::debug!(
                tag = format_args!("0x{raw:08x}"),
                allow_v2,
                "level tag read as v1"
            );
        }

        let max_groups = input.get_i64()?;
        let precision = input.get_i64()?;
        let classify = input.get_expression()?;
        let filter = match tag {
            LevelWireTag::V2 => Some(input.get_expression()?),
            LevelWireTag::V1 => None,
        };
        let collect = input.get_expression()?;

        record(MetricsEvent::LevelDecoded { tag, fallback });

        let level = Self::new(classify, collect)
            .with_max_groups(max_groups)
            .with_precision(precision);

        Ok(match filter {
            Some(filter) => level.with_filter(filter),
            None => level,
        })
    }

    /// Decode a standalone level payload, rejecting trailing bytes.
    pub fn decode_variant(
        bytes: &[u8],
        allow_v2: bool,
        max_payload_bytes: usize,
    ) -> Result<Self, FormatError> {
        let mut input = WireReader::new(bytes, max_payload_bytes);
        let level = Self::deserialize_variant(&mut input, allow_v2)?;
        input.finish()?;

        Ok(level)
    }
}
