//! Wait targets shared between primitives and the scheduler
//!
//! A primitive keeps its counter or bitfield in a [`WaitCell`]. A thread that
//! cannot proceed parks with a [`WaitCondition`] naming the cell and the
//! predicate it needs; the scheduler re-evaluates that predicate on every
//! reschedule and whenever the primitive notifies the cell.

use alloc::sync::Arc;
use core::cell::Cell;
use critical_section::{CriticalSection, Mutex};
use wos_core::{BlockReason, OsError, OsResult, SIGNAL_BITS};

use crate::kernel::KernelServices;

/// Counter or bitfield observed by parked threads.
#[derive(Debug)]
pub struct WaitCell {
    value: Mutex<Cell<u32>>,
}

impl WaitCell {
    pub const fn new(value: u32) -> Self {
        Self {
            value: Mutex::new(Cell::new(value)),
        }
    }

    pub fn shared(value: u32) -> Arc<Self> {
        Arc::new(Self::new(value))
    }

    pub fn get(&self) -> u32 {
        critical_section::with(|cs| self.get_in(cs))
    }

    pub fn get_in(&self, cs: CriticalSection<'_>) -> u32 {
        self.value.borrow(cs).get()
    }

    pub fn set_in(&self, cs: CriticalSection<'_>, value: u32) {
        self.value.borrow(cs).set(value);
    }

    /// Read-modify-write under a critical section.
    pub fn update<R>(&self, f: impl FnOnce(&mut u32) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.value.borrow(cs);
            let mut value = cell.get();
            let result = f(&mut value);
            cell.set(value);
            result
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// `value < limit`: a free mutex or a semaphore with room.
    Below(u32),
    /// `value >= n`: a queue holding at least `n` items.
    AtLeast(u32),
    /// `value & mask != 0`: any of the signal bits set.
    AnyBits(u32),
}

impl Predicate {
    pub const fn holds(self, value: u32) -> bool {
        match self {
            Predicate::Below(limit) => value < limit,
            Predicate::AtLeast(n) => value >= n,
            Predicate::AnyBits(mask) => value & mask != 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaitCondition {
    cell: Arc<WaitCell>,
    predicate: Predicate,
}

impl WaitCondition {
    pub fn new(cell: Arc<WaitCell>, predicate: Predicate) -> Self {
        Self { cell, predicate }
    }

    pub fn holds(&self, cs: CriticalSection<'_>) -> bool {
        self.predicate.holds(self.cell.get_in(cs))
    }

    pub fn targets(&self, cell: &WaitCell) -> bool {
        core::ptr::eq(Arc::as_ptr(&self.cell), cell)
    }

    pub fn predicate(&self) -> Predicate {
        self.predicate
    }
}

/// Why a blocking call came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The wait condition held.
    Ready,
    /// The deadline passed first.
    TimedOut,
    /// Another thread forced the waiter back to running with `resume_thread`.
    Resumed,
}

/// Mask for signal `bit`, rejecting indices outside the 32-bit word.
pub fn signal_mask(bit: u8) -> OsResult<u32> {
    if bit >= SIGNAL_BITS {
        Err(OsError::InvalidParam)
    } else {
        Ok(1u32 << bit)
    }
}

/// Try `attempt`, parking between tries, until it succeeds or `timeout_ms`
/// elapses. A zero timeout is a single attempt.
pub(crate) fn wait_timeout<T>(
    kernel: &dyn KernelServices,
    reason: BlockReason,
    wait: &WaitCondition,
    timeout_ms: u32,
    mut attempt: impl FnMut() -> Option<T>,
) -> OsResult<T> {
    if let Some(value) = attempt() {
        return Ok(value);
    }
    if timeout_ms == 0 {
        return Err(OsError::Timeout);
    }
    let deadline = kernel.now().after(timeout_ms);
    loop {
        match kernel.block_on(reason, wait, Some(deadline)) {
            WaitOutcome::Ready => {
                if let Some(value) = attempt() {
                    return Ok(value);
                }
            }
            WaitOutcome::TimedOut | WaitOutcome::Resumed => return Err(OsError::Timeout),
        }
    }
}

/// Try `attempt`, parking between tries, until it succeeds.
pub(crate) fn wait_indefinite<T>(
    kernel: &dyn KernelServices,
    reason: BlockReason,
    wait: &WaitCondition,
    mut attempt: impl FnMut() -> Option<T>,
) -> T {
    loop {
        if let Some(value) = attempt() {
            return value;
        }
        kernel.block_on(reason, wait, None);
    }
}
