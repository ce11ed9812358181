//! Thread configuration and descriptors

use alloc::sync::Arc;
use wos_core::{Instant, Priority, ThreadState};

use crate::stack::Stack;
use crate::wait::{WaitCell, WaitCondition};

/// Parameters for [`Kernel::add_thread`](crate::Kernel::add_thread).
///
/// ```ignore
/// let cfg = ThreadConfig::new(priority!(5))
///     .with_stack_size(2048)
///     .with_name("imu");
/// ```
#[derive(Debug)]
pub struct ThreadConfig {
    pub(crate) priority: Priority,
    pub(crate) stack_size: Option<usize>,
    pub(crate) stack: Option<Stack>,
    pub(crate) name: &'static str,
}

impl ThreadConfig {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            stack_size: None,
            stack: None,
            name: "thread",
        }
    }

    /// Size of the kernel-allocated stack; ignored when a stack is lent.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Run on a caller-provided stack instead of allocating one.
    pub fn with_stack(mut self, stack: Stack) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

/// One slot of the thread table.
pub(crate) struct Descriptor<C> {
    pub state: ThreadState,
    pub priority: Priority,
    pub name: &'static str,
    pub context: C,
    pub stack: Option<Stack>,
    pub sp: usize,
    pub deadline: Option<Instant>,
    pub wait: Option<WaitCondition>,
    /// Per-thread signal bits
    pub signals: Arc<WaitCell>,
    /// An entry for this slot sits in the ready queue.
    pub queued: bool,
    /// Forced out of a wait by `resume_thread`.
    pub resumed: bool,
}

impl<C: Default> Descriptor<C> {
    pub fn empty() -> Self {
        Self {
            state: ThreadState::Empty,
            priority: Priority::IDLE,
            name: "",
            context: C::default(),
            stack: None,
            sp: 0,
            deadline: None,
            wait: None,
            signals: WaitCell::shared(0),
            queued: false,
            resumed: false,
        }
    }
}

impl<C> Descriptor<C> {
    /// Inside a blocking call: parked, or woken but not yet returned.
    pub fn in_wait(&self) -> bool {
        self.deadline.is_some() || self.wait.is_some()
    }

    pub fn clear_wait(&mut self) {
        self.deadline = None;
        self.wait = None;
        self.resumed = false;
    }

    /// Bytes between the saved stack pointer and the top of the stack.
    pub fn stack_used(&self) -> Option<usize> {
        self.stack.as_ref().map(|s| s.top().saturating_sub(self.sp))
    }

    pub fn owned_stack_bytes(&self) -> usize {
        match &self.stack {
            Some(stack) if stack.is_owned() => stack.len(),
            _ => 0,
        }
    }
}
