//! Platform abstraction
//!
//! Everything above these traits is portable. A port supplies the register
//! save/restore pair, the initial frame for a new thread, a millisecond
//! clock and the periodic tick.

use alloc::boxed::Box;
use wos_core::OsResult;

use crate::stack::Stack;

/// Code a new thread starts in. The kernel wraps the user's entry so that
/// returning from it ends the thread; the closure never returns to the port.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Register-level context switching.
///
/// `Context` is whatever the port needs to resume a thread. The default
/// value stands for the boot context that calls `Kernel::init`.
pub trait ContextSwitch: Sync {
    type Context: Clone + Default + Send;

    /// Build the initial frame on `stack` so that the first switch into the
    /// returned context runs `entry`. Returns the context and the initial
    /// stack pointer.
    fn init_context(
        &self,
        stack: &mut Stack,
        entry: ThreadEntry,
    ) -> OsResult<(Self::Context, usize)>;

    /// Stack pointer of `context` as of this switch away from it.
    fn save_context(&self, context: &Self::Context) -> usize;

    /// Transfer execution from `from` (the caller) to `to`. Returns once
    /// some later switch targets `from` again.
    fn restore_context(&self, from: &Self::Context, to: &Self::Context);
}

/// Time base and tick interrupt.
pub trait TickSource: Sync {
    /// Milliseconds since the tick source started.
    fn now_ms(&self) -> u64;

    /// Start the periodic interrupt that drives `Kernel::tick`.
    fn start_tick(&self, period_us: u32) -> OsResult<()>;

    /// Sleep until the next interrupt. Returns `true` when a tick period
    /// elapsed without an interrupt delivering it, in which case the kernel
    /// runs its tick handler itself.
    fn idle(&self) -> bool;
}

/// Everything the kernel needs from a platform.
pub trait Port: ContextSwitch + TickSource {}

impl<T: ContextSwitch + TickSource> Port for T {}
