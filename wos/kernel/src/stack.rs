//! Thread stacks
//!
//! A stack is either allocated by the kernel, in which case it is released
//! when the slot is recycled, or lent by the caller for the rest of the
//! program and never freed.

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use wos_core::{OsError, OsResult};

pub enum Stack {
    Owned(Box<[u8]>),
    Borrowed(&'static mut [u8]),
}

impl Stack {
    /// Allocate a zeroed stack of `size` bytes.
    pub fn allocate(size: usize) -> OsResult<Self> {
        if size == 0 {
            return Err(OsError::InvalidParam);
        }
        Ok(Stack::Owned(vec![0u8; size].into_boxed_slice()))
    }

    /// Lend a static buffer to the kernel.
    pub fn borrowed(buf: &'static mut [u8]) -> OsResult<Self> {
        if buf.is_empty() {
            return Err(OsError::InvalidParam);
        }
        Ok(Stack::Borrowed(buf))
    }

    /// Wrap a raw buffer handed over from foreign code.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to `len` writable bytes that stay valid
    /// and unaliased for the rest of the program.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> OsResult<Self> {
        if ptr.is_null() {
            return Err(OsError::NullPointer);
        }
        Self::borrowed(core::slice::from_raw_parts_mut(ptr, len))
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Stack::Owned(_))
    }

    /// Lowest address; stacks grow down towards it.
    pub fn base(&self) -> usize {
        self.as_slice().as_ptr() as usize
    }

    /// One past the highest address; the initial stack pointer.
    pub fn top(&self) -> usize {
        self.base() + self.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Stack::Owned(buf) => buf,
            Stack::Borrowed(buf) => buf,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Stack::Owned(buf) => buf,
            Stack::Borrowed(buf) => buf,
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("len", &self.len())
            .field("owned", &self.is_owned())
            .finish()
    }
}
