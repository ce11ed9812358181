//! Millisecond time base used for deadlines

use core::fmt;
use core::ops::Add;

/// Point on the kernel's millisecond clock, counted from boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant(u64);

impl Instant {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Deadline `timeout_ms` after this instant.
    pub const fn after(self, timeout_ms: u32) -> Self {
        Self(self.0.saturating_add(timeout_ms as u64))
    }

    /// True once `now` has reached this deadline.
    pub const fn has_passed(self, now: Instant) -> bool {
        now.0 >= self.0
    }

    /// Milliseconds from `earlier` to `self`, zero if `earlier` is later.
    pub const fn since(self, earlier: Instant) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u32> for Instant {
    type Output = Instant;

    fn add(self, ms: u32) -> Instant {
        self.after(ms)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Instant {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u64}ms", self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_reached_at_equality() {
        let start = Instant::from_millis(40);
        let deadline = start.after(10);
        assert!(!deadline.has_passed(Instant::from_millis(49)));
        assert!(deadline.has_passed(Instant::from_millis(50)));
        assert_eq!(deadline.since(start), 10);
        assert_eq!(start.since(deadline), 0);
    }

    #[test]
    fn test_after_saturates() {
        let late = Instant::from_millis(u64::MAX - 1);
        assert_eq!(late + 10, Instant::from_millis(u64::MAX));
    }
}
