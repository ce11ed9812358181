//! # WOS Kernel
//!
//! Preemptive, static-priority scheduler for a single core, with blocking
//! primitives built on top of it.
//!
//! ## Architecture
//!
//! **Thread table**: a fixed arena of descriptors indexed by [`ThreadId`].
//! Slot 0 is the boot context adopted by [`Kernel::init`]; it is the idle
//! thread and runs whenever nothing else can.
//!
//! **Scheduling**: every tick and every explicit yield saves the outgoing
//! stack pointer, checks it against the stack guard, wakes parked threads
//! whose deadline passed or whose wait condition holds, and pops the
//! highest-priority runnable thread from a max-heap. Equal priorities
//! rotate in FIFO order.
//!
//! **Primitives**: [`Mutex`], [`Semaphore`], [`SignalGroup`] and
//! [`MessageQueue`] keep their state in a shared [`WaitCell`]. A thread that
//! cannot proceed parks on that cell; releasing the primitive wakes matching
//! waiters immediately and preempts if one of them outranks the caller.
//!
//! **Ports**: register save/restore and the tick live behind [`Port`].
//!
//! ## Module Overview
//!
//! - [`kernel`] - the kernel object and the service trait primitives use
//! - [`port`] - platform abstraction
//! - [`mutex`], [`semaphore`], [`signal`], [`queue`] - blocking primitives
//! - [`preempt`] - scoped preemption masking

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod kernel;
pub mod mutex;
pub mod port;
pub mod preempt;
pub mod queue;
mod scheduler;
pub mod semaphore;
pub mod signal;
pub mod stack;
pub mod thread;
pub mod trace;
pub mod wait;

pub use config::{KernelConfig, KernelConfigBuilder};
pub use kernel::{Kernel, KernelServices};
pub use mutex::{Mutex, MutexCell, MutexCellGuard, MutexState};
pub use port::{ContextSwitch, Port, ThreadEntry, TickSource};
pub use preempt::PreemptionGuard;
pub use queue::MessageQueue;
pub use semaphore::Semaphore;
pub use signal::SignalGroup;
pub use stack::Stack;
pub use thread::ThreadConfig;
pub use trace::{TraceHook, TraceRecord};
pub use wait::{WaitCell, WaitOutcome};

pub use wos_core::{
    priority, BlockReason, Instant, OsError, OsResult, Priority, RunState, ThreadId, ThreadState,
    MAX_THREADS,
};

#[cfg(test)]
mod tests;
