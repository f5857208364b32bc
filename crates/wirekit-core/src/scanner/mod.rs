//! Field boundary resolution for protobuf wire format.
//!
//! Given a wire type and the position of a field value, [`field_length`]
//! returns how many bytes the value occupies. Groups have no length
//! prefix, so [`group_length`] walks forward field by field until it hits
//! the matching `END_GROUP` tag, recursing into nested groups through
//! [`field_length`].
//!
//! ## Example
//!
//! ```
//! use wirekit_core::buffer::BufferDecoder;
//! use wirekit_core::scanner::{field_length, tag_wire_type};
//!
//! // Field 1, wire type 2, length 3, "abc"
//! let mut decoder = BufferDecoder::new(vec![0x0A, 0x03, b'a', b'b', b'c']);
//! let tag = decoder.get_unsigned_varint32_at(0)?;
//! let start = decoder.cursor();
//! assert_eq!(field_length(&mut decoder, start, tag_wire_type(tag))?, 4);
//! # Ok::<(), wirekit_core::Error>(())
//! ```

mod wire;

use crate::buffer::BufferDecoder;
use crate::error::{Error, Result};
use std::ops::Range;
use tracing::trace;

pub use wire::{
    make_tag, size_of_varint32, tag_field_number, tag_wire_type, WireType, MAX_VALID_NUMBER,
};

/// Returns the length in bytes of the field value at `start`, not
/// counting the tag.
///
/// For delimited fields the length covers the length prefix and the
/// payload. For groups it runs through the closing `END_GROUP` tag.
/// Varint, delimited and group values leave the decoder's cursor at the
/// end of the consumed region; fixed-width values don't move it.
pub fn field_length(decoder: &mut BufferDecoder, start: usize, wire_type: u8) -> Result<usize> {
    match WireType::try_from(wire_type) {
        Ok(WireType::Varint) => {
            decoder.set_cursor(start);
            decoder.skip_varint()?;
            Ok(decoder.cursor() - start)
        }
        Ok(WireType::Fixed64) => Ok(8),
        Ok(WireType::Delimited) => {
            let data_length = decoder.get_unsigned_varint32_at(start)? as usize;
            Ok(data_length + decoder.cursor() - start)
        }
        Ok(WireType::StartGroup) => group_length(decoder, start),
        Ok(WireType::Fixed32) => Ok(4),
        Ok(WireType::EndGroup) | Err(_) => Err(Error::invalid_wire_type(wire_type, start)),
    }
}

/// Returns the length of a group body starting at `start`, including the
/// closing `END_GROUP` tag.
///
/// `start` points just past the opening `START_GROUP` tag.
pub fn group_length(decoder: &mut BufferDecoder, start: usize) -> Result<usize> {
    let (_, end) = scan_group(decoder, start)?;
    Ok(end - start)
}

/// Walks a group body starting at `start` and returns where its closing
/// `END_GROUP` tag begins and where it ends.
///
/// The end tag is located by reading it, so overlong encodings and end
/// tags carrying another field number still yield the exact body.
fn scan_group(decoder: &mut BufferDecoder, start: usize) -> Result<(usize, usize)> {
    let mut cursor = start;

    while cursor < decoder.end_index() {
        let tag = read_tag(decoder, cursor)?;
        let wire_type = tag_wire_type(tag);

        if wire_type == WireType::EndGroup.code() {
            let end = decoder.cursor();
            trace!("Group at {} closes after {} bytes", start, end - start);
            return Ok((cursor, end));
        }

        let value_start = decoder.cursor();
        cursor = value_start + field_length(decoder, value_start, wire_type)?;
    }

    Err(Error::unterminated_group(start))
}

/// Reads the tag at `position` and moves the cursor past it.
///
/// Tags wider than 32 bits carry a field number above
/// [`MAX_VALID_NUMBER`] and are rejected instead of truncated.
fn read_tag(decoder: &mut BufferDecoder, position: usize) -> Result<u32> {
    let tag = decoder.get_varint64_at(position)?;
    u32::try_from(tag).map_err(|_| Error::InvalidFieldNumber {
        number: u32::try_from(tag >> 3).unwrap_or(u32::MAX),
        max: MAX_VALID_NUMBER,
    })
}

/// One field occurrence found while walking a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    /// Field number from the tag
    pub field_number: u32,
    /// Wire type from the tag
    pub wire_type: WireType,
    /// Byte range of the value, excluding the tag.
    ///
    /// For groups this includes the closing `END_GROUP` tag.
    pub value: Range<usize>,
    /// Byte range of a group's body, i.e. the value without the closing
    /// `END_GROUP` tag. Equal to `value` for every other wire type.
    pub body: Range<usize>,
}

/// Walks every top-level field in the decoder's buffer.
///
/// Field number 0 is rejected when `validate_field_numbers` is set. Tags
/// too wide for any valid field number and values that run past the end
/// of the buffer are always rejected.
pub fn scan_fields(decoder: &mut BufferDecoder, validate_field_numbers: bool) -> Result<Vec<RawField>> {
    let mut fields = Vec::new();
    let mut cursor = decoder.start_index();
    let end = decoder.end_index();

    while cursor < end {
        let tag = read_tag(decoder, cursor)?;
        let field_number = tag_field_number(tag);
        let raw_wire_type = tag_wire_type(tag);
        let value_start = decoder.cursor();

        if validate_field_numbers && field_number == 0 {
            return Err(Error::InvalidFieldNumber {
                number: field_number,
                max: MAX_VALID_NUMBER,
            });
        }

        let (length, body_end) = if raw_wire_type == WireType::StartGroup.code() {
            let (body_end, group_end) = scan_group(decoder, value_start)?;
            (group_end - value_start, body_end)
        } else {
            let length = field_length(decoder, value_start, raw_wire_type)?;
            (length, value_start + length)
        };

        let value_end = value_start + length;
        if value_end > end {
            return Err(Error::truncated(value_start, length, end));
        }

        let wire_type = WireType::try_from(raw_wire_type)
            .map_err(|_| Error::invalid_wire_type(raw_wire_type, value_start))?;

        trace!(
            "Field {} ({:?}) at {}..{}",
            field_number,
            wire_type,
            value_start,
            value_end
        );

        fields.push(RawField {
            field_number,
            wire_type,
            value: value_start..value_end,
            body: value_start..body_end,
        });
        cursor = value_end;
    }

    Ok(fields)
}
