//! Bounded FIFO message queue between threads

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::cell::RefCell;
use core::convert::Infallible;
use critical_section::Mutex;
use wos_core::{BlockReason, OsError, OsResult};

use crate::kernel::KernelServices;
use crate::wait::{wait_indefinite, wait_timeout, Predicate, WaitCell, WaitCondition};

struct Shared<T> {
    items: Mutex<RefCell<VecDeque<T>>>,
    /// Mirrors `items.len()` so waiters can park on it.
    len: Arc<WaitCell>,
    capacity: u32,
}

/// Multi-producer, multi-consumer queue holding up to `capacity` items.
///
/// Senders block while it is full and receivers while it is empty. A push
/// that gives up hands the item back to the caller.
pub struct MessageQueue<'k, T> {
    kernel: &'k dyn KernelServices,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for MessageQueue<'_, T> {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel,
            shared: self.shared.clone(),
        }
    }
}

impl<'k, T> MessageQueue<'k, T> {
    pub fn new(kernel: &'k dyn KernelServices, capacity: u32) -> OsResult<Self> {
        if capacity == 0 {
            return Err(OsError::InvalidParam);
        }
        Ok(Self {
            kernel,
            shared: Arc::new(Shared {
                items: Mutex::new(RefCell::new(VecDeque::with_capacity(capacity as usize))),
                len: WaitCell::shared(0),
                capacity,
            }),
        })
    }

    fn has_room(&self) -> WaitCondition {
        WaitCondition::new(self.shared.len.clone(), Predicate::Below(self.shared.capacity))
    }

    fn has_item(&self) -> WaitCondition {
        WaitCondition::new(self.shared.len.clone(), Predicate::AtLeast(1))
    }

    pub fn try_push(&self, item: T) -> Result<(), T> {
        let shared = &self.shared;
        critical_section::with(|cs| {
            let mut items = shared.items.borrow_ref_mut(cs);
            if items.len() as u32 >= shared.capacity {
                return Err(item);
            }
            items.push_back(item);
            shared.len.set_in(cs, items.len() as u32);
            Ok(())
        })?;
        self.kernel.notify(&shared.len);
        Ok(())
    }

    /// Push, waiting up to `timeout_ms` for room.
    pub fn push(&self, item: T, timeout_ms: u32) -> Result<(), T> {
        let mut pending = Some(item);
        let pushed = wait_timeout(self.kernel, BlockReason::Queue, &self.has_room(), timeout_ms, || {
            let item = pending.take()?;
            match self.try_push(item) {
                Ok(()) => Some(()),
                Err(item) => {
                    pending = Some(item);
                    None
                }
            }
        });
        match (pushed, pending) {
            (Err(_), Some(item)) => Err(item),
            _ => Ok(()),
        }
    }

    pub fn push_indefinite(&self, item: T) {
        let mut pending = Some(item);
        wait_indefinite(self.kernel, BlockReason::Queue, &self.has_room(), || {
            let item = pending.take()?;
            match self.try_push(item) {
                Ok(()) => Some(()),
                Err(item) => {
                    pending = Some(item);
                    None
                }
            }
        })
    }

    pub fn try_pop(&self) -> nb::Result<T, Infallible> {
        let shared = &self.shared;
        let item = critical_section::with(|cs| {
            let mut items = shared.items.borrow_ref_mut(cs);
            let item = items.pop_front();
            shared.len.set_in(cs, items.len() as u32);
            item
        })
        .ok_or(nb::Error::WouldBlock)?;
        self.kernel.notify(&shared.len);
        Ok(item)
    }

    /// Pop, waiting up to `timeout_ms` for an item.
    pub fn pop(&self, timeout_ms: u32) -> OsResult<T> {
        wait_timeout(self.kernel, BlockReason::Queue, &self.has_item(), timeout_ms, || {
            self.try_pop().ok()
        })
    }

    pub fn pop_indefinite(&self) -> T {
        wait_indefinite(self.kernel, BlockReason::Queue, &self.has_item(), || {
            self.try_pop().ok()
        })
    }

    pub fn len(&self) -> usize {
        self.shared.len.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u32 {
        self.shared.capacity
    }
}
