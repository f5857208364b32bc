//! Error types for the wirekit-core library.
//!
//! Every failure in this crate is a decode error surfaced to the caller
//! immediately. Nothing is retried or downgraded.

use crate::scanner::WireType;
use thiserror::Error;

/// Result type alias for wirekit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all wirekit operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A field's own wire type is not one of the five field wire types.
    ///
    /// This includes `END_GROUP` showing up where a field is expected.
    #[error("invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType {
        /// The raw 3-bit wire type code
        wire_type: u8,
        /// Byte offset of the field value
        offset: usize,
    },

    /// A group scan ran off the end of the buffer without an `END_GROUP` tag
    #[error("no end group found for group starting at offset {start}")]
    UnterminatedGroup {
        /// Offset of the first byte after the `START_GROUP` tag
        start: usize,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// A field value extends past the end of its buffer
    #[error("field at offset {offset} with length {length} extends past end of buffer ({end})")]
    Truncated {
        /// Offset of the field value
        offset: usize,
        /// Resolved length of the field value
        length: usize,
        /// End index of the buffer
        end: usize,
    },

    /// Invalid field number in a tag
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// A stored field was encoded with a wire type its accessor cannot read
    #[error("field {field_number} has wire type {actual:?}, expected {expected:?}")]
    UnexpectedWireType {
        /// Field number being accessed
        field_number: u32,
        /// Wire type the accessor reads
        expected: WireType,
        /// Wire type found in the buffer
        actual: WireType,
    },

    /// Positional access past the end of a repeated field
    #[error("index {index} out of bounds for repeated field of length {len}")]
    IndexOutOfBounds {
        /// Requested position
        index: usize,
        /// Number of elements in the field
        len: usize,
    },
}

impl Error {
    /// Creates a new invalid wire type error
    pub fn invalid_wire_type(wire_type: u8, offset: usize) -> Self {
        Self::InvalidWireType { wire_type, offset }
    }

    /// Creates a new unterminated group error
    pub fn unterminated_group(start: usize) -> Self {
        Self::UnterminatedGroup { start }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new truncated field error
    pub fn truncated(offset: usize, length: usize, end: usize) -> Self {
        Self::Truncated {
            offset,
            length,
            end,
        }
    }

    /// Creates a new unexpected wire type error
    pub fn unexpected_wire_type(field_number: u32, expected: WireType, actual: WireType) -> Self {
        Self::UnexpectedWireType {
            field_number,
            expected,
            actual,
        }
    }

    /// Returns true for everything except [`Error::IndexOutOfBounds`].
    ///
    /// [`Error::UnexpectedWireType`] counts as a decode error even when the
    /// stored value came from a setter and the caller read it back through
    /// an accessor for another type.
    pub fn is_decode_error(&self) -> bool {
        !matches!(self, Self::IndexOutOfBounds { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_wire_type(6, 12);
        assert!(err.to_string().contains("invalid wire type 6"));
        assert!(err.to_string().contains("12"));

        let err = Error::unterminated_group(3);
        assert!(err.to_string().contains("no end group found"));
    }

    #[test]
    fn test_is_decode_error() {
        assert!(Error::unterminated_group(0).is_decode_error());
        assert!(Error::varint_decode(4).is_decode_error());
        assert!(!Error::IndexOutOfBounds { index: 2, len: 1 }.is_decode_error());
    }

    #[test]
    fn test_accessor_mismatch_is_decode_error() {
        let kernel = crate::Kernel::create_empty();
        kernel.set_int32(3, 5);

        let err = kernel.get_message::<crate::Kernel>(3, None).unwrap_err();
        assert_eq!(
            err,
            Error::unexpected_wire_type(3, WireType::Delimited, WireType::Varint)
        );
        assert!(err.is_decode_error());
    }
}
