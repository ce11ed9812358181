//! Baton passing between host threads
//!
//! Each kernel thread runs on its own OS thread, but only the one holding
//! the baton executes. A switch hands the baton to the target's gate and
//! parks the caller on its own gate until some later switch hands it back.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    turn: Condvar,
    sp: AtomicUsize,
}

impl Gate {
    fn new(sp: usize) -> Self {
        Self {
            open: Mutex::new(false),
            turn: Condvar::new(),
            sp: AtomicUsize::new(sp),
        }
    }

    /// Block until the baton arrives, then take it.
    pub(crate) fn wait_turn(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.turn.wait(&mut open);
        }
        *open = false;
    }

    pub(crate) fn give_turn(&self) {
        *self.open.lock() = true;
        self.turn.notify_one();
    }
}

/// Saved state of a simulated thread: its gate and stack pointer.
///
/// The default context is the boot thread that runs `Kernel::init`.
#[derive(Debug, Clone)]
pub struct SimContext {
    gate: Arc<Gate>,
}

impl Default for SimContext {
    fn default() -> Self {
        Self {
            gate: Arc::new(Gate::new(0)),
        }
    }
}

impl SimContext {
    pub(crate) fn with_stack_top(top: usize) -> Self {
        Self {
            gate: Arc::new(Gate::new(top)),
        }
    }

    pub(crate) fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    pub fn stack_pointer(&self) -> usize {
        self.gate.sp.load(Ordering::SeqCst)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<(Arc<Gate>, usize)>> = const { RefCell::new(None) };
}

/// Record which gate and stack top belong to the calling OS thread.
pub(crate) fn bind_current(gate: Arc<Gate>, top: usize) {
    CURRENT.with(|current| *current.borrow_mut() = Some((gate, top)));
}

/// Pretend the calling kernel thread has `bytes` of its stack in use.
///
/// Host threads run on their own OS stacks, so the kernel stack is only
/// bookkeeping; this moves the simulated stack pointer so overflow
/// detection and `stack_used` can be exercised. Does nothing on the boot
/// thread.
pub fn simulate_stack_depth(bytes: usize) {
    CURRENT.with(|current| {
        if let Some((gate, top)) = current.borrow().as_ref() {
            gate.sp.store(top.saturating_sub(bytes), Ordering::SeqCst);
        }
    });
}
