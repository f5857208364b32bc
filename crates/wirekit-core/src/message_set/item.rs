//! A single `(type id, message)` entry of a message set.

use super::{MESSAGE_FIELD, TYPE_ID_FIELD};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::message::{FromKernel, InternalMessage};

/// One message set entry: an int32 type id plus the embedded message
/// registered under it.
///
/// The item wraps its own sub-kernel; clones share it.
#[derive(Debug, Clone)]
pub struct Item {
    kernel: Kernel,
}

impl Item {
    /// Creates a new item holding `value` under `type_id`
    pub fn create(type_id: i32, value: &impl InternalMessage) -> Self {
        let kernel = Kernel::create_empty();
        kernel.set_int32(TYPE_ID_FIELD, type_id);
        kernel.set_message(MESSAGE_FIELD, value);
        Self { kernel }
    }

    /// Type id of this item, 0 if unset
    pub fn type_id(&self) -> Result<i32> {
        self.kernel.get_int32_with_default(TYPE_ID_FIELD)
    }

    /// Returns the message, or an empty detached one if unset
    pub fn get_message<T: FromKernel>(&self, pivot: Option<u32>) -> Result<T> {
        self.kernel.get_message(MESSAGE_FIELD, pivot)
    }

    /// Returns the message, or `None` if unset
    pub fn get_message_or_none<T: FromKernel>(&self, pivot: Option<u32>) -> Result<Option<T>> {
        self.kernel.get_message_or_none(MESSAGE_FIELD, pivot)
    }

    /// Returns the message, attaching an empty one first if unset
    pub fn get_or_create_message<T: FromKernel>(&self, pivot: Option<u32>) -> Result<T> {
        self.kernel.get_or_create_message(MESSAGE_FIELD, pivot)
    }

    /// Returns the message's kernel without decoding it into a wrapper
    pub fn get_message_accessor_or_none(&self, pivot: Option<u32>) -> Result<Option<Kernel>> {
        self.kernel.get_message_accessor_or_none(MESSAGE_FIELD, pivot)
    }

    /// Replaces the message
    pub fn set_message(&self, value: &impl InternalMessage) {
        self.kernel.set_message(MESSAGE_FIELD, value);
    }
}

impl FromKernel for Item {
    fn from_kernel(kernel: Kernel) -> Self {
        Self { kernel }
    }
}

impl InternalMessage for Item {
    fn internal_kernel(&self) -> &Kernel {
        &self.kernel
    }
}
