//! Thread identifiers and scheduling priorities

use core::fmt;
use crate::{OsError, OsResult};

/// Index of a descriptor in the kernel's thread table.
///
/// Ids are stable for the lifetime of a thread and are recycled once the
/// slot has ended and `add_thread` reuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u8);

impl ThreadId {
    /// The boot context adopted by `init`; runs when nothing else can.
    pub const IDLE: ThreadId = ThreadId(0);

    /// Slot index in the thread table
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "T{}", self.0);
    }
}

/// Static thread priority; higher values are scheduled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Priority floor, reserved for the idle thread
    pub const IDLE: Priority = Priority(0);

    /// Lowest priority a user thread may have
    pub const MIN: Priority = Priority(1);

    /// Highest priority
    pub const MAX: Priority = Priority(255);

    /// Create a user thread priority. Zero belongs to the idle thread.
    pub fn new(priority: u8) -> OsResult<Self> {
        if priority == 0 {
            Err(OsError::InvalidParam)
        } else {
            Ok(Priority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        Priority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::Priority::new_unchecked($value)
    };
}
