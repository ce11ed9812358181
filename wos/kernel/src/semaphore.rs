//! Counting semaphore

use alloc::sync::Arc;
use core::convert::Infallible;
use wos_core::{BlockReason, OsError, OsResult};

use crate::kernel::KernelServices;
use crate::wait::{wait_indefinite, wait_timeout, Predicate, WaitCell, WaitCondition};

/// Admits up to `max_entry` holders at once. Clones share the same count.
///
/// `entry` takes a place, `exit` gives one back. An `exit` with nobody
/// inside is reported as [`OsError::Underflow`] and leaves the count at
/// zero.
#[derive(Clone)]
pub struct Semaphore<'k> {
    kernel: &'k dyn KernelServices,
    count: Arc<WaitCell>,
    max_entry: u32,
}

impl<'k> Semaphore<'k> {
    pub fn new(kernel: &'k dyn KernelServices, max_entry: u32) -> OsResult<Self> {
        Self::with_count(kernel, max_entry, 0)
    }

    /// Start with `count` places already taken.
    pub fn with_count(kernel: &'k dyn KernelServices, max_entry: u32, count: u32) -> OsResult<Self> {
        if max_entry == 0 || count > max_entry {
            return Err(OsError::InvalidParam);
        }
        Ok(Self {
            kernel,
            count: WaitCell::shared(count),
            max_entry,
        })
    }

    fn room(&self) -> WaitCondition {
        WaitCondition::new(self.count.clone(), Predicate::Below(self.max_entry))
    }

    /// Take a place if one is free; returns the new count.
    pub fn try_entry(&self) -> nb::Result<u32, Infallible> {
        let max = self.max_entry;
        self.count
            .update(|count| {
                if *count < max {
                    *count += 1;
                    Some(*count)
                } else {
                    None
                }
            })
            .ok_or(nb::Error::WouldBlock)
    }

    pub fn entry(&self, timeout_ms: u32) -> OsResult<u32> {
        wait_timeout(self.kernel, BlockReason::Semaphore, &self.room(), timeout_ms, || {
            self.try_entry().ok()
        })
    }

    pub fn entry_wait_indefinite(&self) -> u32 {
        wait_indefinite(self.kernel, BlockReason::Semaphore, &self.room(), || {
            self.try_entry().ok()
        })
    }

    /// Give a place back and wake a waiter; returns the new count.
    pub fn exit(&self) -> OsResult<u32> {
        let count = self
            .count
            .update(|count| {
                if *count == 0 {
                    None
                } else {
                    *count -= 1;
                    Some(*count)
                }
            })
            .ok_or(OsError::Underflow)?;
        self.kernel.notify(&self.count);
        Ok(count)
    }

    /// Current number of holders.
    pub fn get_state(&self) -> u32 {
        self.count.get()
    }

    pub fn max_entry(&self) -> u32 {
        self.max_entry
    }
}
