//! Host simulation port for WOS.
//!
//! Every kernel thread is backed by an OS thread that stays parked unless
//! the scheduler has switched to it, so exactly one kernel thread executes
//! at a time just as on a single core. Time is virtual and advances one
//! tick whenever the kernel idles, which makes timing behavior exactly
//! reproducible in tests.
//!
//! ```ignore
//! let kernel: &'static Kernel<PosixPort> =
//!     Box::leak(Box::new(Kernel::new(PosixPort::new(), KernelConfig::default())));
//! kernel.init()?;
//! kernel.add_thread(ThreadConfig::new(priority!(3)), || { /* ... */ })?;
//! kernel.sleep_ms(100);
//! ```
//!
//! Code that never blocks or yields starves the clock: time only moves
//! while every kernel thread is parked.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::error;
use wos_kernel::{ContextSwitch, OsError, OsResult, Stack, ThreadEntry, TickSource};

mod clock;
mod context;

pub use clock::VirtualClock;
pub use context::{simulate_stack_depth, SimContext};

#[derive(Debug, Default)]
pub struct PosixPort {
    clock: VirtualClock,
    spawned: AtomicUsize,
}

impl PosixPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// OS threads started for kernel threads so far.
    pub fn spawned_threads(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl ContextSwitch for PosixPort {
    type Context = SimContext;

    fn init_context(&self, stack: &mut Stack, entry: ThreadEntry) -> OsResult<(SimContext, usize)> {
        let top = stack.top();
        let ctx = SimContext::with_stack_top(top);
        let gate = ctx.gate().clone();
        let n = self.spawned.fetch_add(1, Ordering::SeqCst);

        std::thread::Builder::new()
            .name(format!("wos-{n}"))
            .spawn(move || {
                context::bind_current(gate.clone(), top);
                gate.wait_turn();
                entry();
            })
            .map_err(|err| {
                error!("cannot spawn host thread: {err}");
                OsError::NoMoreResources
            })?;
        Ok((ctx, top))
    }

    fn save_context(&self, context: &SimContext) -> usize {
        context.stack_pointer()
    }

    fn restore_context(&self, from: &SimContext, to: &SimContext) {
        to.gate().give_turn();
        from.gate().wait_turn();
    }
}

impl TickSource for PosixPort {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn start_tick(&self, period_us: u32) -> OsResult<()> {
        self.clock.start(period_us)
    }

    fn idle(&self) -> bool {
        self.clock.step();
        true
    }
}
