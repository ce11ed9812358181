//! Binary mutex
//!
//! The lock word doubles as the owner record: zero means unlocked, any other
//! value is the holder's thread id plus one. Ownership is advisory unless
//! the kernel was configured with `strict_mutex_ownership`.

use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::convert::Infallible;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use wos_core::{BlockReason, OsError, OsResult, ThreadId};

use crate::kernel::KernelServices;
use crate::wait::{wait_indefinite, wait_timeout, Predicate, WaitCell, WaitCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexState {
    Unlocked,
    Locked,
}

/// Non-reentrant mutex. Clones share the same lock.
#[derive(Clone)]
pub struct Mutex<'k> {
    kernel: &'k dyn KernelServices,
    word: Arc<WaitCell>,
}

const UNLOCKED: u32 = 0;

fn owner_word(id: ThreadId) -> u32 {
    id.0 as u32 + 1
}

impl<'k> Mutex<'k> {
    pub fn new(kernel: &'k dyn KernelServices) -> Self {
        Self {
            kernel,
            word: WaitCell::shared(UNLOCKED),
        }
    }

    fn free(&self) -> WaitCondition {
        WaitCondition::new(self.word.clone(), Predicate::Below(1))
    }

    /// Take the lock if it is free.
    pub fn try_lock(&self) -> nb::Result<(), Infallible> {
        let me = owner_word(self.kernel.current_id());
        let acquired = self.word.update(|word| {
            if *word == UNLOCKED {
                *word = me;
                true
            } else {
                false
            }
        });
        if acquired {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Take the lock, waiting at most `timeout_ms`.
    pub fn lock(&self, timeout_ms: u32) -> OsResult<()> {
        wait_timeout(self.kernel, BlockReason::Mutex, &self.free(), timeout_ms, || {
            self.try_lock().ok()
        })
    }

    pub fn lock_indefinite(&self) {
        wait_indefinite(self.kernel, BlockReason::Mutex, &self.free(), || {
            self.try_lock().ok()
        })
    }

    /// Release the lock and wake waiters. Unlocking a free mutex does nothing.
    pub fn unlock(&self) -> OsResult<()> {
        let me = owner_word(self.kernel.current_id());
        let strict = self.kernel.config().strict_mutex_ownership;
        let released = critical_section::with(|cs| {
            let word = self.word.get_in(cs);
            if word == UNLOCKED {
                return Ok(false);
            }
            if strict && word != me {
                return Err(OsError::NotOwned);
            }
            self.word.set_in(cs, UNLOCKED);
            Ok(true)
        })?;
        if released {
            self.kernel.notify(&self.word);
        }
        Ok(())
    }

    pub fn get_state(&self) -> MutexState {
        if self.word.get() == UNLOCKED {
            MutexState::Unlocked
        } else {
            MutexState::Locked
        }
    }

    /// Thread that last took the lock, while it is held.
    pub fn owner(&self) -> Option<ThreadId> {
        match self.word.get() {
            UNLOCKED => None,
            word => Some(ThreadId((word - 1) as u8)),
        }
    }
}

/// Data protected by a [`Mutex`].
pub struct MutexCell<'k, T> {
    mutex: Mutex<'k>,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reachable through a guard, and a guard exists only
// while the mutex is held.
unsafe impl<T: Send> Sync for MutexCell<'_, T> {}

impl<'k, T> MutexCell<'k, T> {
    pub fn new(kernel: &'k dyn KernelServices, value: T) -> Self {
        Self {
            mutex: Mutex::new(kernel),
            data: UnsafeCell::new(value),
        }
    }

    pub fn try_lock(&self) -> Option<MutexCellGuard<'_, 'k, T>> {
        self.mutex.try_lock().ok().map(|()| self.guard())
    }

    pub fn lock(&self, timeout_ms: u32) -> OsResult<MutexCellGuard<'_, 'k, T>> {
        self.mutex.lock(timeout_ms).map(|()| self.guard())
    }

    pub fn lock_indefinite(&self) -> MutexCellGuard<'_, 'k, T> {
        self.mutex.lock_indefinite();
        self.guard()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn guard(&self) -> MutexCellGuard<'_, 'k, T> {
        MutexCellGuard {
            cell: self,
            _not_send: PhantomData,
        }
    }
}

/// Unlocks on drop.
pub struct MutexCellGuard<'a, 'k, T> {
    cell: &'a MutexCell<'k, T>,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for MutexCellGuard<'_, '_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the mutex is held by this thread.
        unsafe { &*self.cell.data.get() }
    }
}

impl<T> DerefMut for MutexCellGuard<'_, '_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` rules out other borrows.
        unsafe { &mut *self.cell.data.get() }
    }
}

impl<T> Drop for MutexCellGuard<'_, '_, T> {
    fn drop(&mut self) {
        // The guard's thread holds the lock, so this cannot be a foreign unlock.
        let _ = self.cell.mutex.unlock();
    }
}
