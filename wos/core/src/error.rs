//! Error taxonomy shared by the kernel, its primitives and the task runner.

use thiserror::Error;

/// Result type used throughout WOS
pub type OsResult<T> = Result<T, OsError>;

/// Errors returned by kernel operations.
///
/// Every fallible call reports through this enum; nothing in the kernel
/// panics on a caller mistake. Stack overflow is the one failure that is
/// not returned: it ends the offending thread instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OsError {
    /// A required handle or buffer was absent
    #[error("null pointer")]
    NullPointer,
    /// Argument outside its domain (bit index, interval, priority)
    #[error("invalid parameter")]
    InvalidParam,
    /// A blocking call's deadline elapsed
    #[error("operation timed out")]
    Timeout,
    /// Thread table exhausted
    #[error("no more resources")]
    NoMoreResources,
    /// A bounded container is at capacity
    #[error("container full")]
    Full,
    /// Release attempted by a thread that does not hold the resource
    #[error("resource not owned by caller")]
    NotOwned,
    /// Reserved; the kernel does not detect deadlocks itself
    #[error("deadlock")]
    Deadlock,
    /// Thread id or task handle does not name a live entry
    #[error("no such thread or handle")]
    DoesNotExist,
    /// Release without a matching acquire
    #[error("counter underflow")]
    Underflow,
    /// Kernel used before `init`
    #[error("kernel not initialized")]
    NotInitialized,
}

impl OsError {
    /// Numeric status code for C-style callers and log lines.
    pub const fn code(self) -> i32 {
        match self {
            OsError::DoesNotExist => -1,
            OsError::InvalidParam => -2,
            OsError::Full => -5,
            OsError::NotInitialized => -6,
            OsError::Underflow => -8,
            OsError::Timeout => -9,
            OsError::Deadlock => -11,
            OsError::NoMoreResources => -12,
            OsError::NotOwned => -13,
            OsError::NullPointer => -15,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OsError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            OsError::NullPointer => defmt::write!(fmt, "NullPointer"),
            OsError::InvalidParam => defmt::write!(fmt, "InvalidParam"),
            OsError::Timeout => defmt::write!(fmt, "Timeout"),
            OsError::NoMoreResources => defmt::write!(fmt, "NoMoreResources"),
            OsError::Full => defmt::write!(fmt, "Full"),
            OsError::NotOwned => defmt::write!(fmt, "NotOwned"),
            OsError::Deadlock => defmt::write!(fmt, "Deadlock"),
            OsError::DoesNotExist => defmt::write!(fmt, "DoesNotExist"),
            OsError::Underflow => defmt::write!(fmt, "Underflow"),
            OsError::NotInitialized => defmt::write!(fmt, "NotInitialized"),
        }
    }
}
