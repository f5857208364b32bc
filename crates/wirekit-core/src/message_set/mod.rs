//! MessageSet: an extension registry keyed by type id.
//!
//! On the wire a message set is a single repeated group (field 1) of
//! [`Item`]s, each carrying a type id (field 2) and an embedded message
//! (field 3). [`MessageSet`] exposes that as a map from type id to message.
//!
//! ## Indexing
//!
//! The map is built on first access and cached for the lifetime of the
//! message set. If the encoded items repeat a type id, the last one wins
//! and the backing field is rewritten once, in index order, so it holds a
//! single item per id.
//!
//! After that the index is authoritative:
//! - Adding or removing a type id rewrites the whole backing field
//! - Replacing the message of an existing type id updates that item in place
//!
//! ## Example
//!
//! ```
//! use wirekit_core::{Kernel, MessageSet};
//!
//! let mut set = MessageSet::create_empty();
//! let value = Kernel::create_empty();
//! value.set_int32(1, 42);
//!
//! set.set_extension(7, &value)?;
//! let found: Kernel = set.get_extension_or_none(7, None)?.unwrap();
//! assert_eq!(found.get_int32_with_default(1)?, 42);
//! assert_eq!(set.item_count()?, 1);
//! # Ok::<(), wirekit_core::Error>(())
//! ```

mod item;

use crate::error::Result;
use crate::kernel::Kernel;
use crate::message::{FromKernel, InternalMessage};
use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{debug, trace};

pub use item::Item;

/// Field number of the repeated item group
pub const ITEMS_FIELD: u32 = 1;
/// Field number of an item's type id
pub const TYPE_ID_FIELD: u32 = 2;
/// Field number of an item's message
pub const MESSAGE_FIELD: u32 = 3;

type ItemIndex = IndexMap<i32, Item>;

/// Lazily built view of the backing items
#[derive(Debug, Default)]
enum Index {
    #[default]
    Unbuilt,
    Built(ItemIndex),
}

impl Index {
    fn get_or_build(&mut self, kernel: &Kernel) -> Result<&mut ItemIndex> {
        match *self {
            Index::Built(ref mut index) => Ok(index),
            Index::Unbuilt => {
                *self = Index::Built(build_index(kernel)?);
                self.get_or_build(kernel)
            }
        }
    }
}

/// Reads every encoded item, keeping the last one per type id, and
/// normalizes the backing field if there were duplicates.
fn build_index(kernel: &Kernel) -> Result<ItemIndex> {
    let mut index = ItemIndex::new();
    let mut total = 0;

    for item in kernel.get_repeated_group_iterable::<Item>(ITEMS_FIELD)? {
        index.insert(item.type_id()?, item);
        total += 1;
    }

    debug!(
        "Indexed {} message set items ({} distinct type ids)",
        total,
        index.len()
    );

    if total > index.len() {
        debug!(
            "Dropping {} duplicate message set items",
            total - index.len()
        );
        write_items(kernel, &index);
    }

    Ok(index)
}

fn write_items(kernel: &Kernel, index: &ItemIndex) {
    trace!("Rewriting {} message set items", index.len());
    kernel.set_repeated_group_iterable(ITEMS_FIELD, index.values());
}

/// Extension registry mapping type ids to embedded messages.
///
/// Not thread-safe: the index is an unsynchronized cache over a shared
/// [`Kernel`].
#[derive(Debug)]
pub struct MessageSet {
    kernel: Kernel,
    index: Index,
}

impl Default for MessageSet {
    fn default() -> Self {
        Self::create_empty()
    }
}

impl MessageSet {
    /// Wraps an existing kernel
    pub fn from_kernel(kernel: Kernel) -> Self {
        Self {
            kernel,
            index: Index::Unbuilt,
        }
    }

    /// Creates a message set with no items
    pub fn create_empty() -> Self {
        Self::from_kernel(Kernel::create_empty())
    }

    /// Indexes an encoded message set
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        Kernel::from_bytes(bytes).map(Self::from_kernel)
    }

    /// All items, one per type id, in index order
    pub fn items(&mut self) -> Result<indexmap::map::Values<'_, i32, Item>> {
        Ok(self.index.get_or_build(&self.kernel)?.values())
    }

    /// Number of distinct type ids
    pub fn item_count(&mut self) -> Result<usize> {
        Ok(self.index.get_or_build(&self.kernel)?.len())
    }

    /// Item at `position` of the backing field, bypassing the index
    pub fn item_at(&self, position: usize) -> Result<Item> {
        self.kernel
            .get_repeated_group_element(ITEMS_FIELD, position)
    }

    /// Returns true if an item is registered under `type_id`
    pub fn has_extension(&mut self, type_id: i32) -> Result<bool> {
        Ok(self.index.get_or_build(&self.kernel)?.contains_key(&type_id))
    }

    /// Returns the message registered under `type_id`, or `None`
    pub fn get_extension_or_none<T: FromKernel>(
        &mut self,
        type_id: i32,
        pivot: Option<u32>,
    ) -> Result<Option<T>> {
        match self.find_item(type_id)? {
            Some(item) => item.get_message_or_none(pivot),
            None => Ok(None),
        }
    }

    /// Returns the kernel of the message registered under `type_id`
    /// without wrapping it, or `None`
    pub fn get_extension_accessor_or_none(
        &mut self,
        type_id: i32,
        pivot: Option<u32>,
    ) -> Result<Option<Kernel>> {
        match self.find_item(type_id)? {
            Some(item) => item.get_message_accessor_or_none(pivot),
            None => Ok(None),
        }
    }

    /// Returns the message registered under `type_id`, registering a new
    /// empty message first if there is none.
    ///
    /// The returned message stays reachable through
    /// [`get_extension_or_none`](Self::get_extension_or_none) until it is
    /// replaced or cleared.
    pub fn get_or_create_extension<T: FromKernel>(
        &mut self,
        type_id: i32,
        pivot: Option<u32>,
    ) -> Result<T> {
        if let Some(item) = self.find_item(type_id)? {
            return item.get_or_create_message(pivot);
        }

        let kernel = Kernel::create_empty();
        self.set_extension(type_id, &kernel)?;
        Ok(T::from_kernel(kernel))
    }

    /// Registers `value` under `type_id`.
    ///
    /// An existing item is updated in place; a new type id is appended to
    /// the index and the backing field is rewritten.
    pub fn set_extension(&mut self, type_id: i32, value: &impl InternalMessage) -> Result<()> {
        let index = self.index.get_or_build(&self.kernel)?;

        if let Some(item) = index.get(&type_id) {
            item.set_message(value);
            return Ok(());
        }

        index.insert(type_id, Item::create(type_id, value));
        write_items(&self.kernel, index);
        Ok(())
    }

    /// Removes the item registered under `type_id`, if any
    pub fn clear_extension(&mut self, type_id: i32) -> Result<()> {
        let index = self.index.get_or_build(&self.kernel)?;

        if index.shift_remove(&type_id).is_some() {
            write_items(&self.kernel, index);
        }
        Ok(())
    }

    fn find_item(&mut self, type_id: i32) -> Result<Option<Item>> {
        Ok(self
            .index
            .get_or_build(&self.kernel)?
            .get(&type_id)
            .cloned())
    }
}

impl FromKernel for MessageSet {
    fn from_kernel(kernel: Kernel) -> Self {
        MessageSet::from_kernel(kernel)
    }
}

impl InternalMessage for MessageSet {
    fn internal_kernel(&self) -> &Kernel {
        &self.kernel
    }
}
