//! Per-kernel field table.

use super::Kernel;
use crate::scanner::{RawField, WireType};
use std::collections::BTreeMap;

/// A value written through the accessor API
#[derive(Debug, Clone)]
pub(crate) enum FieldValue {
    Int32(i32),
    Message(Kernel),
    Groups(Vec<Kernel>),
}

impl FieldValue {
    /// Wire type this value would be encoded with
    pub(crate) fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Int32(_) => WireType::Varint,
            FieldValue::Message(_) => WireType::Delimited,
            FieldValue::Groups(_) => WireType::StartGroup,
        }
    }
}

/// All state for one field number.
///
/// `raw` holds the occurrences found in the kernel's buffer. Once a value
/// is decoded or written it lives in `value` and `raw` is no longer read.
#[derive(Debug, Clone, Default)]
pub(crate) struct Field {
    pub(crate) raw: Vec<RawField>,
    pub(crate) value: Option<FieldValue>,
}

impl Field {
    pub(crate) fn is_present(&self) -> bool {
        self.value.is_some() || !self.raw.is_empty()
    }

    pub(crate) fn set(&mut self, value: FieldValue) {
        self.raw.clear();
        self.value = Some(value);
    }
}

/// Field table split at the pivot: field numbers below it are slots in a
/// vector, the rest live in an ordered map.
#[derive(Debug, Clone)]
pub(crate) struct FieldStorage {
    pivot: u32,
    dense: Vec<Option<Field>>,
    sparse: BTreeMap<u32, Field>,
}

impl FieldStorage {
    pub(crate) fn new(pivot: u32) -> Self {
        Self {
            pivot,
            dense: Vec::new(),
            sparse: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, field_number: u32) -> Option<&Field> {
        if field_number < self.pivot {
            self.dense.get(field_number as usize).and_then(Option::as_ref)
        } else {
            self.sparse.get(&field_number)
        }
    }

    pub(crate) fn get_mut(&mut self, field_number: u32) -> Option<&mut Field> {
        if field_number < self.pivot {
            self.dense
                .get_mut(field_number as usize)
                .and_then(Option::as_mut)
        } else {
            self.sparse.get_mut(&field_number)
        }
    }

    pub(crate) fn get_or_insert(&mut self, field_number: u32) -> &mut Field {
        if field_number < self.pivot {
            let slot = field_number as usize;
            if self.dense.len() <= slot {
                self.dense.resize_with(slot + 1, || None);
            }
            self.dense[slot].get_or_insert_with(Field::default)
        } else {
            self.sparse.entry(field_number).or_default()
        }
    }

    pub(crate) fn remove(&mut self, field_number: u32) -> Option<Field> {
        if field_number < self.pivot {
            self.dense
                .get_mut(field_number as usize)
                .and_then(Option::take)
        } else {
            self.sparse.remove(&field_number)
        }
    }

    /// Number of field numbers with a value or raw occurrence
    pub(crate) fn len(&self) -> usize {
        self.dense
            .iter()
            .flatten()
            .chain(self.sparse.values())
            .filter(|field| field.is_present())
            .count()
    }
}
