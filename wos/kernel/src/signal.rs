//! Signal groups: 32 event bits shared between threads

use alloc::sync::Arc;
use wos_core::{BlockReason, OsResult};

use crate::kernel::KernelServices;
use crate::wait::{signal_mask, wait_indefinite, wait_timeout, Predicate, WaitCell, WaitCondition};

/// Thirty-two independent event bits. Clones share the same word.
///
/// Setting a bit wakes every thread waiting on it straight away. Waiting
/// does not consume the bit unless [`wait_and_clear`](Self::wait_and_clear)
/// is used.
#[derive(Clone)]
pub struct SignalGroup<'k> {
    kernel: &'k dyn KernelServices,
    bits: Arc<WaitCell>,
}

impl<'k> SignalGroup<'k> {
    pub fn new(kernel: &'k dyn KernelServices) -> Self {
        Self {
            kernel,
            bits: WaitCell::shared(0),
        }
    }

    fn any_of(&self, mask: u32) -> WaitCondition {
        WaitCondition::new(self.bits.clone(), Predicate::AnyBits(mask))
    }

    pub fn signal(&self, bit: u8) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        self.bits.update(|bits| *bits |= mask);
        self.kernel.notify(&self.bits);
        Ok(())
    }

    pub fn clear(&self, bit: u8) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        self.bits.update(|bits| *bits &= !mask);
        Ok(())
    }

    pub fn check(&self, bit: u8) -> OsResult<bool> {
        let mask = signal_mask(bit)?;
        Ok(self.bits.get() & mask != 0)
    }

    /// Wait up to `timeout_ms` for `bit`; the bit stays set.
    pub fn wait(&self, bit: u8, timeout_ms: u32) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        wait_timeout(self.kernel, BlockReason::Signal, &self.any_of(mask), timeout_ms, || {
            (self.bits.get() & mask != 0).then_some(())
        })
    }

    /// Wait up to `timeout_ms` for `bit` and clear it in the same step.
    pub fn wait_and_clear(&self, bit: u8, timeout_ms: u32) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        wait_timeout(self.kernel, BlockReason::Signal, &self.any_of(mask), timeout_ms, || {
            self.take(mask)
        })
    }

    pub fn wait_no_timeout(&self, bit: u8) -> OsResult<()> {
        let mask = signal_mask(bit)?;
        wait_indefinite(self.kernel, BlockReason::Signal, &self.any_of(mask), || {
            (self.bits.get() & mask != 0).then_some(())
        });
        Ok(())
    }

    fn take(&self, mask: u32) -> Option<()> {
        self.bits.update(|bits| {
            if *bits & mask != 0 {
                *bits &= !mask;
                Some(())
            } else {
                None
            }
        })
    }

    /// Snapshot of all 32 bits.
    pub fn bits(&self) -> u32 {
        self.bits.get()
    }
}
