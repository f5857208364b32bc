//! Traits connecting message wrapper types to their backing [`Kernel`].
//!
//! Wrapper types hold nothing but a kernel handle. Accessors that hand out
//! embedded messages are generic over [`FromKernel`], which stands in for a
//! factory function, and accept any [`InternalMessage`] as a value.

use crate::kernel::Kernel;

/// A message backed by a [`Kernel`]
pub trait InternalMessage {
    /// Returns the kernel holding this message's fields
    fn internal_kernel(&self) -> &Kernel;
}

/// A message type that can be constructed around an existing [`Kernel`]
pub trait FromKernel: Sized {
    /// Wraps `kernel` without copying it
    fn from_kernel(kernel: Kernel) -> Self;
}

impl InternalMessage for Kernel {
    fn internal_kernel(&self) -> &Kernel {
        self
    }
}

impl FromKernel for Kernel {
    fn from_kernel(kernel: Kernel) -> Self {
        kernel
    }
}
