//! Virtual tick clock
//!
//! Time moves only when the kernel idles: each idle period advances the
//! clock by one tick. Runs are deterministic and take no wall time.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use wos_kernel::{OsError, OsResult};

#[derive(Debug)]
pub struct VirtualClock {
    micros: AtomicU64,
    period_us: AtomicU32,
    running: AtomicBool,
}

impl VirtualClock {
    pub const fn new() -> Self {
        Self {
            micros: AtomicU64::new(0),
            period_us: AtomicU32::new(1_000),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self, period_us: u32) -> OsResult<()> {
        if period_us == 0 {
            return Err(OsError::InvalidParam);
        }
        self.period_us.store(period_us, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn period_us(&self) -> u32 {
        self.period_us.load(Ordering::SeqCst)
    }

    /// Advance by one tick period.
    pub fn step(&self) {
        self.micros
            .fetch_add(self.period_us() as u64, Ordering::SeqCst);
    }

    pub fn now_ms(&self) -> u64 {
        self.micros.load(Ordering::SeqCst) / 1_000
    }

    pub fn now_us(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}
