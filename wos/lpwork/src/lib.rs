//! # WOS low-priority work
//!
//! Runs periodic callbacks on one background kernel thread. Work that is
//! not time critical (housekeeping, status LEDs, statistics) registers a
//! closure and an interval instead of paying for a thread and stack of its
//! own.
//!
//! ```ignore
//! let work = LpWork::start(kernel, LpWorkConfig::default())?;
//! let blink = work.register_task(|| led.toggle(), 500)?;
//! work.disable(blink)?;
//! ```
//!
//! Callbacks run in registration order when several fall due together, at
//! the runner's priority, and never concurrently with each other. They are
//! called without the registry locked, so a callback may register, enable,
//! disable or remove tasks, itself included.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod config;
mod registry;

use alloc::boxed::Box;
use alloc::sync::Arc;
use log::{debug, info};
use wos_kernel::{Kernel, KernelServices, MutexCell, OsResult, Port, ThreadConfig, ThreadId};

pub use config::LpWorkConfig;
pub use registry::TaskHandle;

use registry::Registry;

/// Thread-signal bit that tells the runner its task list changed.
const WAKE_BIT: u8 = 0;

/// Handle to a running deferred-work thread. Clones drive the same runner.
#[derive(Clone)]
pub struct LpWork {
    kernel: &'static dyn KernelServices,
    registry: Arc<MutexCell<'static, Registry>>,
    runner: ThreadId,
}

impl LpWork {
    /// Spawn the runner thread on `kernel`.
    pub fn start<P: Port + 'static, const N: usize>(
        kernel: &'static Kernel<P, N>,
        config: LpWorkConfig,
    ) -> OsResult<Self> {
        let registry = Arc::new(MutexCell::new(kernel, Registry::new(config.capacity)));
        let runner = Runner {
            kernel,
            registry: registry.clone(),
            idle_interval_ms: config.idle_interval_ms,
        };
        let thread = ThreadConfig::new(config.priority)
            .with_stack_size(config.stack_size)
            .with_name("lpwork");
        let id = kernel.add_thread(thread, move || runner.run())?;
        info!(
            "lpwork runner {} started at {}, {} task slots",
            id, config.priority, config.capacity
        );
        Ok(Self {
            kernel,
            registry,
            runner: id,
        })
    }

    /// Call `callback` every `interval_ms`, first at now + `interval_ms`.
    pub fn register_task<F>(&self, callback: F, interval_ms: u32) -> OsResult<TaskHandle>
    where
        F: FnMut() + Send + 'static,
    {
        let now = self.kernel.now();
        let handle = self
            .registry
            .lock_indefinite()
            .register(Box::new(callback), interval_ms, now)?;
        debug!("{} registered every {}ms", handle, interval_ms);
        self.wake_runner();
        Ok(handle)
    }

    /// Resume a disabled task; its next run is one interval from now.
    pub fn enable(&self, handle: TaskHandle) -> OsResult<()> {
        let now = self.kernel.now();
        self.registry.lock_indefinite().enable(handle, now)?;
        self.wake_runner();
        Ok(())
    }

    pub fn disable(&self, handle: TaskHandle) -> OsResult<()> {
        self.registry.lock_indefinite().disable(handle)
    }

    pub fn remove(&self, handle: TaskHandle) -> OsResult<()> {
        self.registry.lock_indefinite().remove(handle)?;
        debug!("{} removed", handle);
        Ok(())
    }

    pub fn is_enabled(&self, handle: TaskHandle) -> OsResult<bool> {
        self.registry.lock_indefinite().is_enabled(handle)
    }

    pub fn task_count(&self) -> usize {
        self.registry.lock_indefinite().len()
    }

    /// The runner's kernel thread.
    pub fn thread_id(&self) -> ThreadId {
        self.runner
    }

    fn wake_runner(&self) {
        // Only fails once the runner thread has been killed.
        let _ = self.kernel.signal_thread(self.runner, WAKE_BIT);
    }
}

struct Runner {
    kernel: &'static dyn KernelServices,
    registry: Arc<MutexCell<'static, Registry>>,
    idle_interval_ms: u32,
}

impl Runner {
    fn run(self) {
        let me = self.kernel.current_id();
        loop {
            let _ = self.kernel.clear_thread_signal(me, WAKE_BIT);

            let now = self.kernel.now();
            let due = self.registry.lock_indefinite().take_due(now);
            for (handle, mut callback) in due {
                callback();
                self.registry.lock_indefinite().restore(handle, callback);
            }

            let now = self.kernel.now();
            let wait = self
                .registry
                .lock_indefinite()
                .next_wait(now)
                .unwrap_or(self.idle_interval_ms);
            if wait == 0 {
                self.kernel.yield_now();
            } else {
                // Timing out is the normal way round the loop.
                let _ = self.kernel.wait_thread_signal(WAKE_BIT, wait);
            }
        }
    }
}
