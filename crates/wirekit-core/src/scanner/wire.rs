//! Wire types, tags and varint sizing.
//!
//! ## Wire Format Overview
//!
//! Each field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: FIXED64 (fixed64, sfixed64, double)
//! - 2: DELIMITED (string, bytes, embedded messages, packed repeated fields)
//! - 3: START_GROUP (deprecated)
//! - 4: END_GROUP (deprecated, only ever terminates a group)
//! - 5: FIXED32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Delimited = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Returns the raw 3-bit code
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::Delimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::invalid_wire_type(value, 0)),
        }
    }
}

/// Maximum valid field number (2^29 - 1)
pub const MAX_VALID_NUMBER: u32 = 536_870_911;

/// Returns the wire type code stored in the low 3 bits of a tag.
///
/// Never fails: callers reject codes 6 and 7 where the wire type is used.
pub fn tag_wire_type(tag: u32) -> u8 {
    (tag & 0x07) as u8
}

/// Returns the field number stored in a tag
pub fn tag_field_number(tag: u32) -> u32 {
    tag >> 3
}

/// Builds a tag from a field number and wire type
pub fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << 3) | u32::from(wire_type.code())
}

/// Number of bytes needed to encode `value` as a varint.
pub fn size_of_varint32(mut value: u32) -> usize {
    let mut size = 1;
    while value >= 128 {
        size += 1;
        value >>= 7;
    }
    size
}
