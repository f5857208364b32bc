//! Field-indexed store backing every message.
//!
//! A [`Kernel`] owns an immutable byte buffer plus a table of fields keyed
//! by field number. Construction walks the buffer once with
//! [`scan_fields`](crate::scanner::scan_fields) to record where each field
//! occurrence lives; values are decoded only when an accessor asks for them.
//!
//! Kernels are reference-counted handles. Cloning a kernel yields another
//! handle to the same fields, which is how a parent message and the
//! sub-messages it hands out share state. Handles are `!Send` and `!Sync`;
//! concurrent use needs external synchronization.
//!
//! Decoding rules:
//! - Scalars and embedded messages: the last occurrence in the buffer wins
//! - Repeated groups: every occurrence, in buffer order
//! - Embedded messages are cached once decoded, so repeated gets return
//!   the same kernel

mod storage;

use crate::buffer::BufferDecoder;
use crate::error::{Error, Result};
use crate::message::{FromKernel, InternalMessage};
use crate::scanner::{scan_fields, RawField, WireType};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;
use storage::{Field, FieldStorage, FieldValue};
use tracing::{debug, trace};

/// Default split between slot and map storage for field numbers
pub const DEFAULT_PIVOT: u32 = 24;

/// Configuration for kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Field numbers below this are kept in slot storage
    pub pivot: u32,
    /// Reject field number 0 while indexing. Field numbers above
    /// `MAX_VALID_NUMBER` can't be encoded in a 32-bit tag and are always
    /// rejected.
    pub validate_field_numbers: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            pivot: DEFAULT_PIVOT,
            validate_field_numbers: true,
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage pivot
    pub fn pivot(mut self, pivot: u32) -> Self {
        self.pivot = pivot;
        self
    }

    /// Sets whether field numbers are validated while indexing
    pub fn validate_field_numbers(mut self, validate: bool) -> Self {
        self.validate_field_numbers = validate;
        self
    }

    /// Config for a sub-message, with an optional pivot override
    fn for_child(self, pivot: Option<u32>) -> Self {
        match pivot {
            Some(pivot) => self.pivot(pivot),
            None => self,
        }
    }
}

#[derive(Debug)]
struct KernelState {
    decoder: BufferDecoder,
    fields: FieldStorage,
    config: KernelConfig,
}

/// Shared handle to a field-indexed message store
#[derive(Debug, Clone)]
pub struct Kernel {
    state: Rc<RefCell<KernelState>>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::create_empty()
    }
}

impl Kernel {
    /// Creates a kernel with no buffer and no fields
    pub fn create_empty() -> Self {
        Self::create_empty_with_config(KernelConfig::default())
    }

    /// Creates an empty kernel with custom configuration
    pub fn create_empty_with_config(config: KernelConfig) -> Self {
        Self::from_parts(BufferDecoder::new(Bytes::new()), FieldStorage::new(config.pivot), config)
    }

    /// Indexes `bytes` as a message
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        Self::from_bytes_with_config(bytes, KernelConfig::default())
    }

    /// Indexes `bytes` as a message with custom configuration
    pub fn from_bytes_with_config(bytes: impl Into<Bytes>, config: KernelConfig) -> Result<Self> {
        let mut decoder = BufferDecoder::new(bytes);
        let raw_fields = scan_fields(&mut decoder, config.validate_field_numbers)?;

        let mut fields = FieldStorage::new(config.pivot);
        let occurrences = raw_fields.len();
        for raw in raw_fields {
            fields.get_or_insert(raw.field_number).raw.push(raw);
        }

        debug!(
            "Indexed {} field occurrences from {} bytes",
            occurrences,
            decoder.end_index()
        );

        Ok(Self::from_parts(decoder, fields, config))
    }

    fn from_parts(decoder: BufferDecoder, fields: FieldStorage, config: KernelConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(KernelState {
                decoder,
                fields,
                config,
            })),
        }
    }

    /// Returns this kernel's configuration
    pub fn config(&self) -> KernelConfig {
        self.state.borrow().config
    }

    /// Returns true if both handles refer to the same kernel
    pub fn ptr_eq(&self, other: &Kernel) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Returns true if `field_number` has a value or an encoded occurrence
    pub fn has_field(&self, field_number: u32) -> bool {
        self.state
            .borrow()
            .fields
            .get(field_number)
            .is_some_and(Field::is_present)
    }

    /// Number of distinct fields present
    pub fn field_count(&self) -> usize {
        self.state.borrow().fields.len()
    }

    /// Removes `field_number` entirely
    pub fn clear_field(&self, field_number: u32) {
        self.state.borrow_mut().fields.remove(field_number);
    }

    /// Returns the int32 stored in `field_number`, or 0 if it is absent
    pub fn get_int32_with_default(&self, field_number: u32) -> Result<i32> {
        let mut state = self.state.borrow_mut();
        let KernelState {
            decoder, fields, ..
        } = &mut *state;

        let Some(field) = fields.get_mut(field_number) else {
            return Ok(0);
        };

        match &field.value {
            Some(FieldValue::Int32(value)) => return Ok(*value),
            Some(other) => {
                return Err(Error::unexpected_wire_type(
                    field_number,
                    WireType::Varint,
                    other.wire_type(),
                ))
            }
            None => {}
        }

        let Some(raw) = field.raw.last() else {
            return Ok(0);
        };
        expect_wire_type(raw, WireType::Varint)?;

        // Negative int32 values are sign-extended to ten bytes on the wire
        let value = decoder.get_varint64_at(raw.value.start)? as i32;
        field.set(FieldValue::Int32(value));
        Ok(value)
    }

    /// Stores an int32 in `field_number`
    pub fn set_int32(&self, field_number: u32, value: i32) {
        self.set_value(field_number, FieldValue::Int32(value));
    }

    /// Returns the embedded message in `field_number`, or `None` if absent.
    ///
    /// The decoded message is cached, so later calls return the same kernel.
    /// `pivot` only applies when the message is decoded by this call.
    pub fn get_message_or_none<T: FromKernel>(
        &self,
        field_number: u32,
        pivot: Option<u32>,
    ) -> Result<Option<T>> {
        let mut state = self.state.borrow_mut();
        let KernelState {
            decoder,
            fields,
            config,
        } = &mut *state;

        let Some(field) = fields.get_mut(field_number) else {
            return Ok(None);
        };

        if let Some(kernel) = cached_message(field_number, field)? {
            return Ok(Some(T::from_kernel(kernel)));
        }

        let Some(kernel) = decode_message(decoder, field, config.for_child(pivot))? else {
            return Ok(None);
        };
        field.set(FieldValue::Message(kernel.clone()));
        Ok(Some(T::from_kernel(kernel)))
    }

    /// Returns the embedded message in `field_number`, or an empty detached
    /// message if absent
    pub fn get_message<T: FromKernel>(&self, field_number: u32, pivot: Option<u32>) -> Result<T> {
        match self.get_message_or_none(field_number, pivot)? {
            Some(message) => Ok(message),
            None => Ok(T::from_kernel(Kernel::create_empty_with_config(
                self.config().for_child(pivot),
            ))),
        }
    }

    /// Returns the embedded message in `field_number`, attaching a new empty
    /// one first if absent
    pub fn get_or_create_message<T: FromKernel>(
        &self,
        field_number: u32,
        pivot: Option<u32>,
    ) -> Result<T> {
        if let Some(message) = self.get_message_or_none(field_number, pivot)? {
            return Ok(message);
        }

        let kernel = Kernel::create_empty_with_config(self.config().for_child(pivot));
        self.set_value(field_number, FieldValue::Message(kernel.clone()));
        Ok(T::from_kernel(kernel))
    }

    /// Returns the kernel of the embedded message in `field_number` without
    /// caching it.
    ///
    /// A message that was already decoded or set is returned as the shared
    /// kernel; otherwise the result is a fresh, unattached view of the bytes.
    pub fn get_message_accessor_or_none(
        &self,
        field_number: u32,
        pivot: Option<u32>,
    ) -> Result<Option<Kernel>> {
        let mut state = self.state.borrow_mut();
        let KernelState {
            decoder,
            fields,
            config,
        } = &mut *state;

        let Some(field) = fields.get_mut(field_number) else {
            return Ok(None);
        };

        if let Some(kernel) = cached_message(field_number, field)? {
            return Ok(Some(kernel));
        }
        decode_message(decoder, field, config.for_child(pivot))
    }

    /// Stores `value` as the embedded message in `field_number`
    pub fn set_message(&self, field_number: u32, value: &impl InternalMessage) {
        self.set_value(
            field_number,
            FieldValue::Message(value.internal_kernel().clone()),
        );
    }

    /// Returns every element of the repeated group `field_number`
    pub fn get_repeated_group_iterable<T: FromKernel>(
        &self,
        field_number: u32,
    ) -> Result<impl Iterator<Item = T>> {
        let kernels = self.repeated_group_kernels(field_number)?;
        Ok(kernels.into_iter().map(T::from_kernel))
    }

    /// Returns element `index` of the repeated group `field_number`
    pub fn get_repeated_group_element<T: FromKernel>(
        &self,
        field_number: u32,
        index: usize,
    ) -> Result<T> {
        let kernels = self.repeated_group_kernels(field_number)?;
        let len = kernels.len();
        kernels
            .into_iter()
            .nth(index)
            .map(T::from_kernel)
            .ok_or(Error::IndexOutOfBounds { index, len })
    }

    /// Number of elements in the repeated group `field_number`
    pub fn get_repeated_group_size(&self, field_number: u32) -> Result<usize> {
        Ok(self.repeated_group_kernels(field_number)?.len())
    }

    /// Replaces the repeated group `field_number` with `items`
    pub fn set_repeated_group_iterable<'a, T, I>(&self, field_number: u32, items: I)
    where
        T: InternalMessage + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let kernels: Vec<Kernel> = items
            .into_iter()
            .map(|item| item.internal_kernel().clone())
            .collect();
        trace!(
            "Writing {} group elements to field {}",
            kernels.len(),
            field_number
        );
        self.set_value(field_number, FieldValue::Groups(kernels));
    }

    fn set_value(&self, field_number: u32, value: FieldValue) {
        self.state
            .borrow_mut()
            .fields
            .get_or_insert(field_number)
            .set(value);
    }

    /// Decodes (once) and returns the kernels of a repeated group
    fn repeated_group_kernels(&self, field_number: u32) -> Result<Vec<Kernel>> {
        let mut state = self.state.borrow_mut();
        let KernelState {
            decoder,
            fields,
            config,
        } = &mut *state;

        let Some(field) = fields.get_mut(field_number) else {
            return Ok(Vec::new());
        };

        match &field.value {
            Some(FieldValue::Groups(kernels)) => return Ok(kernels.clone()),
            Some(other) => {
                return Err(Error::unexpected_wire_type(
                    field_number,
                    WireType::StartGroup,
                    other.wire_type(),
                ))
            }
            None => {}
        }

        let mut kernels = Vec::with_capacity(field.raw.len());
        for raw in &field.raw {
            expect_wire_type(raw, WireType::StartGroup)?;
            let body = raw.body.clone();
            let bytes = decoder
                .slice(body.clone())
                .ok_or_else(|| Error::truncated(body.start, body.len(), decoder.end_index()))?;
            kernels.push(Kernel::from_bytes_with_config(bytes, *config)?);
        }

        debug!(
            "Decoded {} group elements for field {}",
            kernels.len(),
            field_number
        );
        field.set(FieldValue::Groups(kernels.clone()));
        Ok(kernels)
    }
}

/// Returns the message already stored in `field`, if any
fn cached_message(field_number: u32, field: &Field) -> Result<Option<Kernel>> {
    match &field.value {
        Some(FieldValue::Message(kernel)) => Ok(Some(kernel.clone())),
        Some(other) => Err(Error::unexpected_wire_type(
            field_number,
            WireType::Delimited,
            other.wire_type(),
        )),
        None => Ok(None),
    }
}

/// Decodes the last encoded occurrence of a message field into a new kernel
fn decode_message(
    decoder: &mut BufferDecoder,
    field: &Field,
    config: KernelConfig,
) -> Result<Option<Kernel>> {
    let Some(raw) = field.raw.last() else {
        return Ok(None);
    };
    expect_wire_type(raw, WireType::Delimited)?;

    // Skip the length prefix
    decoder.get_unsigned_varint32_at(raw.value.start)?;
    let payload = decoder.cursor()..raw.value.end;
    let bytes = decoder
        .slice(payload.clone())
        .ok_or_else(|| Error::truncated(payload.start, payload.len(), decoder.end_index()))?;

    Kernel::from_bytes_with_config(bytes, config).map(Some)
}

fn expect_wire_type(raw: &RawField, expected: WireType) -> Result<()> {
    if raw.wire_type == expected {
        Ok(())
    } else {
        Err(Error::unexpected_wire_type(
            raw.field_number,
            expected,
            raw.wire_type,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::encoding::{encode_key, encode_varint, WireType as EncodeWireType};

    fn int32_field(field_number: u32, value: i32, buf: &mut Vec<u8>) {
        encode_key(field_number, EncodeWireType::Varint, buf);
        encode_varint(value as i64 as u64, buf);
    }

    fn message_field(field_number: u32, body: &[u8], buf: &mut Vec<u8>) {
        encode_key(field_number, EncodeWireType::LengthDelimited, buf);
        encode_varint(body.len() as u64, buf);
        buf.extend_from_slice(body);
    }

    fn group_field(field_number: u32, body: &[u8], buf: &mut Vec<u8>) {
        encode_key(field_number, EncodeWireType::StartGroup, buf);
        buf.extend_from_slice(body);
        encode_key(field_number, EncodeWireType::EndGroup, buf);
    }

    #[test]
    fn test_empty_kernel() {
        let kernel = Kernel::create_empty();
        assert!(!kernel.has_field(1));
        assert_eq!(kernel.field_count(), 0);
        assert_eq!(kernel.get_int32_with_default(1).unwrap(), 0);
        assert!(kernel.get_message_or_none::<Kernel>(1, None).unwrap().is_none());
        assert_eq!(kernel.get_repeated_group_size(1).unwrap(), 0);
    }

    #[test]
    fn test_int32_from_bytes() {
        let mut buf = Vec::new();
        int32_field(1, 5, &mut buf);
        int32_field(2, -3, &mut buf);
        int32_field(1, 9, &mut buf);

        let kernel = Kernel::from_bytes(buf).unwrap();
        assert_eq!(kernel.field_count(), 2);
        // Last occurrence wins
        assert_eq!(kernel.get_int32_with_default(1).unwrap(), 9);
        assert_eq!(kernel.get_int32_with_default(2).unwrap(), -3);
        assert_eq!(kernel.get_int32_with_default(3).unwrap(), 0);
    }

    #[test]
    fn test_set_int32() {
        let kernel = Kernel::create_empty();
        kernel.set_int32(40, 12);
        assert!(kernel.has_field(40));
        assert_eq!(kernel.get_int32_with_default(40).unwrap(), 12);

        kernel.clear_field(40);
        assert!(!kernel.has_field(40));
    }

    #[test]
    fn test_wire_type_mismatch() {
        let mut buf = Vec::new();
        message_field(1, &[], &mut buf);
        let kernel = Kernel::from_bytes(buf).unwrap();

        assert_eq!(
            kernel.get_int32_with_default(1).unwrap_err(),
            Error::unexpected_wire_type(1, WireType::Varint, WireType::Delimited)
        );
        assert!(kernel.get_repeated_group_size(1).is_err());
    }

    #[test]
    fn test_message_is_cached() {
        let mut inner = Vec::new();
        int32_field(1, 42, &mut inner);
        let mut buf = Vec::new();
        message_field(3, &inner, &mut buf);

        let kernel = Kernel::from_bytes(buf).unwrap();
        let first: Kernel = kernel.get_message_or_none(3, None).unwrap().unwrap();
        let second: Kernel = kernel.get_message(3, None).unwrap();

        assert_eq!(first.get_int32_with_default(1).unwrap(), 42);
        assert!(first.ptr_eq(&second));

        first.set_int32(1, 7);
        assert_eq!(second.get_int32_with_default(1).unwrap(), 7);
    }

    #[test]
    fn test_accessor_does_not_attach() {
        let mut inner = Vec::new();
        int32_field(1, 42, &mut inner);
        let mut buf = Vec::new();
        message_field(3, &inner, &mut buf);

        let kernel = Kernel::from_bytes(buf).unwrap();
        let accessor = kernel.get_message_accessor_or_none(3, None).unwrap().unwrap();
        let message: Kernel = kernel.get_message(3, None).unwrap();

        assert_eq!(accessor.get_int32_with_default(1).unwrap(), 42);
        assert!(!accessor.ptr_eq(&message));

        // Once attached, the accessor hands out the shared kernel
        let again = kernel.get_message_accessor_or_none(3, None).unwrap().unwrap();
        assert!(again.ptr_eq(&message));
    }

    #[test]
    fn test_get_message_default_is_detached() {
        let kernel = Kernel::create_empty();
        let message: Kernel = kernel.get_message(3, None).unwrap();
        message.set_int32(1, 1);
        assert!(!kernel.has_field(3));
    }

    #[test]
    fn test_get_or_create_message() {
        let kernel = Kernel::create_empty();
        let created: Kernel = kernel.get_or_create_message(3, Some(2)).unwrap();
        assert_eq!(created.config().pivot, 2);
        assert!(kernel.has_field(3));

        let again: Kernel = kernel.get_or_create_message(3, None).unwrap();
        assert!(created.ptr_eq(&again));
    }

    #[test]
    fn test_message_pivot_override() {
        let mut buf = Vec::new();
        message_field(3, &[], &mut buf);
        let kernel = Kernel::from_bytes(buf).unwrap();

        let message: Kernel = kernel.get_message(3, Some(100)).unwrap();
        assert_eq!(message.config().pivot, 100);
        assert_eq!(kernel.config().pivot, DEFAULT_PIVOT);
    }

    #[test]
    fn test_repeated_groups() {
        let mut first = Vec::new();
        int32_field(2, 10, &mut first);
        let mut second = Vec::new();
        int32_field(2, 20, &mut second);

        let mut buf = Vec::new();
        group_field(1, &first, &mut buf);
        int32_field(5, 1, &mut buf);
        group_field(1, &second, &mut buf);

        let kernel = Kernel::from_bytes(buf).unwrap();
        assert_eq!(kernel.get_repeated_group_size(1).unwrap(), 2);

        let values: Vec<i32> = kernel
            .get_repeated_group_iterable::<Kernel>(1)
            .unwrap()
            .map(|k| k.get_int32_with_default(2).unwrap())
            .collect();
        assert_eq!(values, vec![10, 20]);

        let element: Kernel = kernel.get_repeated_group_element(1, 1).unwrap();
        let again: Kernel = kernel.get_repeated_group_element(1, 1).unwrap();
        assert!(element.ptr_eq(&again));

        assert_eq!(
            kernel.get_repeated_group_element::<Kernel>(1, 2).unwrap_err(),
            Error::IndexOutOfBounds { index: 2, len: 2 }
        );
    }

    #[test]
    fn test_set_repeated_group() {
        let kernel = Kernel::create_empty();
        let a = Kernel::create_empty();
        let b = Kernel::create_empty();
        kernel.set_repeated_group_iterable(1, [&a, &b]);

        assert_eq!(kernel.get_repeated_group_size(1).unwrap(), 2);
        let first: Kernel = kernel.get_repeated_group_element(1, 0).unwrap();
        assert!(first.ptr_eq(&a));
    }

    #[test]
    fn test_group_with_multi_byte_end_tag() {
        // Field 16 tags need two bytes
        let mut body = Vec::new();
        int32_field(2, 77, &mut body);
        let mut buf = Vec::new();
        group_field(16, &body, &mut buf);

        let kernel = Kernel::from_bytes(buf).unwrap();
        let group: Kernel = kernel.get_repeated_group_element(16, 0).unwrap();
        assert_eq!(group.get_int32_with_default(2).unwrap(), 77);
        assert_eq!(group.field_count(), 1);
    }

    #[test]
    fn test_malformed_buffers() {
        assert_eq!(
            Kernel::from_bytes(vec![0x0B, 0x10, 0x01]).unwrap_err(),
            Error::unterminated_group(1)
        );
        assert_eq!(
            Kernel::from_bytes(vec![0x0E, 0x00]).unwrap_err(),
            Error::invalid_wire_type(6, 1)
        );
    }

    #[test]
    fn test_nested_message_errors_surface_on_access() {
        // Embedded message body holds an unterminated group
        let mut buf = Vec::new();
        message_field(3, &[0x0B, 0x10, 0x01], &mut buf);
        let kernel = Kernel::from_bytes(buf).unwrap();

        assert!(kernel.has_field(3));
        assert_eq!(
            kernel.get_message_or_none::<Kernel>(3, None).unwrap_err(),
            Error::unterminated_group(1)
        );
    }

    #[test]
    fn test_oversized_field_number_is_rejected() {
        let mut buf = Vec::new();
        encode_varint(((1u64 << 29) + 1) << 3, &mut buf);
        encode_varint(42, &mut buf);

        assert_eq!(
            Kernel::from_bytes(buf).unwrap_err(),
            Error::InvalidFieldNumber {
                number: 536_870_913,
                max: crate::scanner::MAX_VALID_NUMBER,
            }
        );
    }

    #[test]
    fn test_group_with_overlong_end_tag() {
        // END_GROUP 1 padded to two bytes
        let kernel = Kernel::from_bytes(vec![0x0B, 0x10, 0x07, 0x8C, 0x00]).unwrap();
        let group: Kernel = kernel.get_repeated_group_element(1, 0).unwrap();

        assert_eq!(group.get_int32_with_default(2).unwrap(), 7);
        assert_eq!(group.field_count(), 1);
    }

    #[test]
    fn test_group_with_mismatched_end_tag() {
        // Group 1 closed by END_GROUP 2
        let kernel = Kernel::from_bytes(vec![0x0B, 0x10, 0x07, 0x14]).unwrap();
        assert_eq!(kernel.get_repeated_group_size(1).unwrap(), 1);

        let group: Kernel = kernel.get_repeated_group_element(1, 0).unwrap();
        assert_eq!(group.get_int32_with_default(2).unwrap(), 7);
    }
}
