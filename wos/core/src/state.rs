//! Thread and kernel state machines

use core::fmt;

/// Lifecycle state of a thread descriptor.
///
/// `Running` means eligible to run; exactly one running descriptor is the
/// active execution context at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Slot never used
    Empty,
    Running,
    Sleeping,
    Suspended,
    BlockedOnMutex,
    BlockedOnMutexTimeout,
    BlockedOnSemaphore,
    BlockedOnSemaphoreTimeout,
    BlockedOnSignal,
    BlockedOnSignalTimeout,
    BlockedOnQueue,
    BlockedOnQueueTimeout,
    /// Entry returned, killed or overflowed; slot may be reused
    Ended,
}

impl ThreadState {
    /// `add_thread` may only take slots in these states.
    pub const fn is_allocatable(self) -> bool {
        matches!(self, ThreadState::Empty | ThreadState::Ended)
    }

    /// Slot holds a thread that has not ended.
    pub const fn is_live(self) -> bool {
        !self.is_allocatable()
    }

    /// Parked on a primitive.
    pub const fn is_blocked(self) -> bool {
        self.block_reason().is_some()
    }

    /// Parked with a wake deadline.
    pub const fn is_timed(self) -> bool {
        matches!(
            self,
            ThreadState::Sleeping
                | ThreadState::BlockedOnMutexTimeout
                | ThreadState::BlockedOnSemaphoreTimeout
                | ThreadState::BlockedOnSignalTimeout
                | ThreadState::BlockedOnQueueTimeout
        )
    }

    /// Sleeping or blocked; resolved by the scheduler's unblock pass.
    pub const fn is_waiting(self) -> bool {
        matches!(self, ThreadState::Sleeping) || self.is_blocked()
    }

    pub const fn block_reason(self) -> Option<BlockReason> {
        match self {
            ThreadState::BlockedOnMutex | ThreadState::BlockedOnMutexTimeout => {
                Some(BlockReason::Mutex)
            }
            ThreadState::BlockedOnSemaphore | ThreadState::BlockedOnSemaphoreTimeout => {
                Some(BlockReason::Semaphore)
            }
            ThreadState::BlockedOnSignal | ThreadState::BlockedOnSignalTimeout => {
                Some(BlockReason::Signal)
            }
            ThreadState::BlockedOnQueue | ThreadState::BlockedOnQueueTimeout => {
                Some(BlockReason::Queue)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadState::Empty => "EMPTY",
            ThreadState::Running => "RUNNING",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Suspended => "SUSPENDED",
            ThreadState::BlockedOnMutex => "BLOCKED_ON_MUTEX",
            ThreadState::BlockedOnMutexTimeout => "BLOCKED_ON_MUTEX_TIMEOUT",
            ThreadState::BlockedOnSemaphore => "BLOCKED_ON_SEMAPHORE",
            ThreadState::BlockedOnSemaphoreTimeout => "BLOCKED_ON_SEMAPHORE_TIMEOUT",
            ThreadState::BlockedOnSignal => "BLOCKED_ON_SIGNAL",
            ThreadState::BlockedOnSignalTimeout => "BLOCKED_ON_SIGNAL_TIMEOUT",
            ThreadState::BlockedOnQueue => "BLOCKED_ON_QUEUE",
            ThreadState::BlockedOnQueueTimeout => "BLOCKED_ON_QUEUE_TIMEOUT",
            ThreadState::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadState {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", match self {
            ThreadState::Empty => "EMPTY",
            ThreadState::Running => "RUNNING",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Suspended => "SUSPENDED",
            ThreadState::Ended => "ENDED",
            _ => "BLOCKED",
        });
    }
}

/// What a blocked thread is parked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Mutex,
    Semaphore,
    Signal,
    Queue,
}

impl BlockReason {
    /// Descriptor state for a wait on this primitive.
    pub const fn state(self, timed: bool) -> ThreadState {
        match (self, timed) {
            (BlockReason::Mutex, false) => ThreadState::BlockedOnMutex,
            (BlockReason::Mutex, true) => ThreadState::BlockedOnMutexTimeout,
            (BlockReason::Semaphore, false) => ThreadState::BlockedOnSemaphore,
            (BlockReason::Semaphore, true) => ThreadState::BlockedOnSemaphoreTimeout,
            (BlockReason::Signal, false) => ThreadState::BlockedOnSignal,
            (BlockReason::Signal, true) => ThreadState::BlockedOnSignalTimeout,
            (BlockReason::Queue, false) => ThreadState::BlockedOnQueue,
            (BlockReason::Queue, true) => ThreadState::BlockedOnQueueTimeout,
        }
    }
}

/// Whether the tick is allowed to preempt the running thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    /// `init` ran, no tick has rescheduled yet
    FirstRun,
    Started,
    /// Tick-driven preemption masked by `os_stop`
    Stopped,
}

impl RunState {
    pub const fn is_preemptible(self) -> bool {
        matches!(self, RunState::FirstRun | RunState::Started)
    }
}
