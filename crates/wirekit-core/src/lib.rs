//! # wirekit-core
//!
//! Low-level wire-format engine for protobuf-style binary messages.
//!
//! This crate provides:
//! - Field boundary resolution for every wire type, including nested groups
//! - A field-indexed message store that decodes values lazily
//! - The MessageSet extension registry: typed sub-messages keyed by type id
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scanner`]: Wire types, varint sizing and field length resolution
//! - [`buffer`]: Cursor-based reads over an immutable byte buffer
//! - [`kernel`]: The field-indexed store behind every message
//! - [`message`]: Traits tying message wrappers to their kernel
//! - [`message_set`]: The extension registry
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use wirekit_core::{Kernel, MessageSet};
//!
//! // One item: group 1 { type_id: 7, message: { field 1: 42 } }
//! let bytes = vec![0x0B, 0x10, 0x07, 0x1A, 0x02, 0x08, 0x2A, 0x0C];
//! let mut set = MessageSet::from_bytes(bytes)?;
//!
//! let message: Kernel = set.get_extension_or_none(7, None)?.unwrap();
//! assert_eq!(message.get_int32_with_default(1)?, 42);
//! # Ok::<(), wirekit_core::Error>(())
//! ```
//!
//! ## Threading
//!
//! Everything here is single-threaded. [`Kernel`] handles are reference
//! counted without synchronization and are neither `Send` nor `Sync`.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod buffer;
pub mod error;
pub mod kernel;
pub mod message;
pub mod message_set;
pub mod scanner;

// Re-export primary types for convenience
pub use buffer::BufferDecoder;
pub use error::{Error, Result};
pub use kernel::{Kernel, KernelConfig, DEFAULT_PIVOT};
pub use message::{FromKernel, InternalMessage};
pub use message_set::{Item, MessageSet};
pub use scanner::{field_length, group_length, size_of_varint32, tag_wire_type, WireType};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = scanner::MAX_VALID_NUMBER;
