use alloc::sync::Arc;
use wos_core::{Instant, Priority, ThreadId, ThreadState};

/// Scheduler event reported to an installed [`TraceHook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceRecord {
    ThreadAdded { id: ThreadId, priority: Priority },
    ThreadEnded { id: ThreadId },
    Switch { from: ThreadId, to: ThreadId, at: Instant },
    Blocked { id: ThreadId, state: ThreadState },
    Woken { id: ThreadId, at: Instant },
    /// A timed wait hit its deadline before its condition held.
    TimedOut { id: ThreadId, at: Instant },
    StackOverflow { id: ThreadId },
}

/// Called with each record once the scheduler's critical section is
/// released, in the order the records were produced. It may query the kernel
/// but must not block or switch threads.
pub type TraceHook = Arc<dyn Fn(&TraceRecord) + Send + Sync>;
